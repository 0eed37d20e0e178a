//! 全局错误处理模块
//!
//! 提供统一的应用错误类型和稳定的错误代码，供绑定层转换为宿主语言的异常
//!
//! # 功能
//!
//! - 统一的 `AppError` 类型，聚合所有模块错误
//! - 用户友好的错误消息
//! - 错误代码用于绑定层识别
//! - 错误恢复建议
//!
//! # 使用示例
//!
//! ```
//! use soundport::audio::{host_from_id, HostId};
//! use soundport::utils::error::{AppError, ErrorCode};
//!
//! fn open() -> Result<(), AppError> {
//!     let _host = host_from_id(HostId::Virtual)?;
//!     Ok(())
//! }
//!
//! assert!(open().is_ok());
//! let err = AppError::from(soundport::audio::AudioError::StreamClosed);
//! assert_eq!(err.code(), ErrorCode::AudioStreamClosed);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::config::StreamDirection;
use crate::audio::error::AudioError;
use crate::state::config::ConfigError;

/// 应用错误类型
///
/// 聚合所有模块的错误类型，提供统一的错误处理接口
#[derive(Error, Debug)]
pub enum AppError {
    /// 音频错误
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 错误代码
///
/// 用于绑定层识别和处理特定错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 音频错误 (1xxx)
    /// 音频主机不可用
    AudioHostUnavailable,
    /// 设备不支持该方向
    AudioConfigUnavailable,
    /// 流配置不受支持
    AudioInvalidConfig,
    /// 设备被占用
    AudioDeviceBusy,
    /// 设备已断开
    AudioDeviceNotAvailable,
    /// 流已关闭
    AudioStreamClosed,
    /// 缓冲区正被播放中的流使用
    AudioBufferBusy,
    /// 后端错误
    AudioBackendError,

    // 配置错误 (4xxx)
    /// 配置加载失败
    ConfigLoadFailed,
    /// 配置无效
    ConfigInvalid,

    // 通用错误 (9xxx)
    /// 内部错误
    InternalError,
}

/// 错误上下文信息
///
/// 提供用户友好的错误信息和恢复建议
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// 错误代码
    pub code: ErrorCode,
    /// 用户友好的错误消息
    pub message: String,
    /// 详细错误信息（用于日志）
    pub detail: Option<String>,
    /// 恢复建议
    pub recovery_hint: Option<String>,
    /// 是否可恢复
    pub recoverable: bool,
}

impl ErrorContext {
    /// 创建新的错误上下文
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            recovery_hint: None,
            recoverable: true,
        }
    }

    /// 设置详细信息
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 设置恢复建议
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    /// 标记为不可恢复
    pub fn not_recoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl AppError {
    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            // 音频错误
            AppError::Audio(AudioError::HostUnavailable(_)) => ErrorCode::AudioHostUnavailable,
            AppError::Audio(AudioError::ConfigUnavailable { .. }) => {
                ErrorCode::AudioConfigUnavailable
            }
            AppError::Audio(AudioError::InvalidConfig(_)) => ErrorCode::AudioInvalidConfig,
            AppError::Audio(AudioError::DeviceBusy(_)) => ErrorCode::AudioDeviceBusy,
            AppError::Audio(AudioError::DeviceNotAvailable(_)) => {
                ErrorCode::AudioDeviceNotAvailable
            }
            AppError::Audio(AudioError::StreamClosed) => ErrorCode::AudioStreamClosed,
            AppError::Audio(AudioError::BufferBusy) => ErrorCode::AudioBufferBusy,
            AppError::Audio(AudioError::BackendSpecific(_)) => ErrorCode::AudioBackendError,

            // 配置错误
            AppError::Config(ConfigError::Invalid(_)) => ErrorCode::ConfigInvalid,
            AppError::Config(ConfigError::Json(_)) => ErrorCode::ConfigInvalid,
            AppError::Config(ConfigError::Io(_)) => ErrorCode::ConfigLoadFailed,

            // 通用错误
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// 获取用户友好的错误消息
    pub fn user_message(&self) -> String {
        match self {
            // 音频错误
            AppError::Audio(AudioError::HostUnavailable(id)) => {
                format!("音频主机 {} 不可用", id)
            }
            AppError::Audio(AudioError::ConfigUnavailable { direction }) => match direction {
                StreamDirection::Input => "该设备不支持录音".to_string(),
                StreamDirection::Output => "该设备不支持播放".to_string(),
            },
            AppError::Audio(AudioError::InvalidConfig(_)) => {
                "设备不支持所请求的音频格式".to_string()
            }
            AppError::Audio(AudioError::DeviceBusy(_)) => {
                "音频设备正被其他程序占用".to_string()
            }
            AppError::Audio(AudioError::DeviceNotAvailable(_)) => {
                "音频设备已断开".to_string()
            }
            AppError::Audio(AudioError::StreamClosed) => {
                "音频流已关闭".to_string()
            }
            AppError::Audio(AudioError::BufferBusy) => {
                "音频缓冲区正在播放中，无法清空".to_string()
            }
            AppError::Audio(AudioError::BackendSpecific(_)) => {
                "音频后端错误".to_string()
            }

            // 配置错误
            AppError::Config(ConfigError::Io(_)) => {
                "无法读取配置文件".to_string()
            }
            AppError::Config(ConfigError::Json(_)) => {
                "配置文件格式错误".to_string()
            }
            AppError::Config(ConfigError::Invalid(msg)) => {
                format!("配置无效: {}", msg)
            }

            // 通用错误
            AppError::Internal(msg) => {
                format!("内部错误: {}", msg)
            }
        }
    }

    /// 获取完整的错误上下文
    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new(self.code(), self.user_message())
            .with_detail(self.to_string());

        // 添加恢复建议
        ctx.recovery_hint = self.recovery_hint();

        if !self.is_recoverable() {
            ctx = ctx.not_recoverable();
        }

        ctx
    }

    /// 获取恢复建议
    pub fn recovery_hint(&self) -> Option<String> {
        match self {
            AppError::Audio(AudioError::HostUnavailable(_)) => {
                Some("请从 available_hosts() 中选择其他音频主机".to_string())
            }
            AppError::Audio(AudioError::ConfigUnavailable { .. })
            | AppError::Audio(AudioError::InvalidConfig(_)) => {
                Some("请查询设备支持的配置范围后重试".to_string())
            }
            AppError::Audio(AudioError::DeviceBusy(_)) => {
                Some("请关闭占用设备的程序，稍后重试".to_string())
            }
            AppError::Audio(AudioError::DeviceNotAvailable(_)) => {
                Some("请重新连接设备或选择其他设备".to_string())
            }
            _ => None,
        }
    }

    /// 检查错误是否可恢复
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Audio(err) => err.is_recoverable(),
            AppError::Config(_) | AppError::Internal(_) => false,
        }
    }
}
