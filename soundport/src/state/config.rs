//! 配置模块
//!
//! 提供 Soundport 配置的加载、保存和全局访问
//!
//! # 配置来源
//!
//! - `ConfigManager::load(path)` 从指定 JSON 文件加载
//! - `ConfigManager::load_from_env()` 读取 `SOUNDPORT_CONFIG` 环境变量指向的文件
//! - 均不存在时使用默认配置
//!
//! # 使用示例
//!
//! ```
//! use soundport::state::config::{self, SoundportConfig};
//!
//! // 读取当前配置（无锁）
//! let current = config::current();
//! assert!(current.buffer.capacity > 0);
//!
//! // 安装新配置
//! let mut updated = SoundportConfig::default();
//! updated.beep.frequency_hz = 880.0;
//! config::install(updated).unwrap();
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::backend::VirtualHostConfig;
use crate::audio::buffer::DEFAULT_CAPACITY;

/// 指定配置文件路径的环境变量
pub const CONFIG_ENV_VAR: &str = "SOUNDPORT_CONFIG";

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 配置值无效
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 配置结果类型
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Soundport 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundportConfig {
    /// 缓冲区配置
    pub buffer: BufferConfig,
    /// 测试音配置
    pub beep: BeepConfig,
    /// 虚拟音频主机配置
    pub virtual_host: VirtualHostConfig,
}

/// 缓冲区配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// `AudioBuffer::new()` 使用的容量（采样数）
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// 测试音（beep stream）配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeepConfig {
    /// 频率（Hz）
    pub frequency_hz: f32,
    /// 幅度（0.0 - 1.0）
    pub amplitude: f32,
}

impl Default for BeepConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            amplitude: 0.5,
        }
    }
}

impl SoundportConfig {
    /// 校验配置
    ///
    /// # Errors
    ///
    /// 任一字段无效时返回 `ConfigError::Invalid`
    pub fn validate(&self) -> ConfigResult<()> {
        if self.buffer.capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer.capacity must be positive".to_string(),
            ));
        }

        if !self.beep.frequency_hz.is_finite() || self.beep.frequency_hz <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "beep.frequency_hz must be positive, got {}",
                self.beep.frequency_hz
            )));
        }

        if !(0.0..=1.0).contains(&self.beep.amplitude) {
            return Err(ConfigError::Invalid(format!(
                "beep.amplitude must be within [0, 1], got {}",
                self.beep.amplitude
            )));
        }

        if self.virtual_host.period_frames == 0 {
            return Err(ConfigError::Invalid(
                "virtual_host.period_frames must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for device in &self.virtual_host.devices {
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate virtual device '{}'",
                    device.name
                )));
            }
            device.default_config.validate().map_err(|e| {
                ConfigError::Invalid(format!("virtual device '{}': {}", device.name, e))
            })?;
        }

        Ok(())
    }
}

/// 配置管理器
///
/// 提供配置文件的加载和保存
pub struct ConfigManager;

impl ConfigManager {
    /// 加载配置
    ///
    /// 文件不存在时返回默认配置
    ///
    /// # Arguments
    ///
    /// * `path` - 配置文件路径
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<SoundportConfig> {
        let path = path.as_ref();

        tracing::debug!(path = %path.display(), "Loading config");

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: SoundportConfig = serde_json::from_str(&content)?;
            config.validate()?;
            tracing::info!(path = %path.display(), "Config loaded successfully");
            Ok(config)
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Ok(SoundportConfig::default())
        }
    }

    /// 保存配置
    ///
    /// # Arguments
    ///
    /// * `path` - 配置文件路径
    /// * `config` - 要保存的配置
    pub fn save(path: impl AsRef<Path>, config: &SoundportConfig) -> ConfigResult<()> {
        let path = path.as_ref();

        tracing::debug!(path = %path.display(), "Saving config");

        // 确保目录存在
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Config saved successfully");
        Ok(())
    }

    /// 从环境变量指定的文件加载配置
    ///
    /// 未设置 `SOUNDPORT_CONFIG` 时返回默认配置
    pub fn load_from_env() -> ConfigResult<SoundportConfig> {
        match Self::env_path() {
            Some(path) => Self::load(path),
            None => Ok(SoundportConfig::default()),
        }
    }

    /// 环境变量中的配置文件路径
    pub fn env_path() -> Option<PathBuf> {
        std::env::var_os(CONFIG_ENV_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    /// 检查配置文件是否存在
    pub fn exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }
}

/// 全局配置状态
///
/// 使用 ArcSwap 实现无锁读取
pub struct GlobalConfig {
    config: ArcSwap<SoundportConfig>,
}

impl GlobalConfig {
    /// 创建新的全局配置
    pub fn new(config: SoundportConfig) -> Self {
        Self {
            config: ArcSwap::new(Arc::new(config)),
        }
    }

    /// 获取当前配置
    pub fn get(&self) -> Arc<SoundportConfig> {
        self.config.load_full()
    }

    /// 更新配置
    pub fn update(&self, config: SoundportConfig) {
        self.config.store(Arc::new(config));
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::new(SoundportConfig::default())
    }
}

/// 进程级配置实例
///
/// 首次访问时从 `SOUNDPORT_CONFIG` 加载，失败时回退到默认配置
pub fn global() -> &'static GlobalConfig {
    static GLOBAL: OnceLock<GlobalConfig> = OnceLock::new();

    GLOBAL.get_or_init(|| {
        let config = ConfigManager::load_from_env().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config from environment, using defaults");
            SoundportConfig::default()
        });
        GlobalConfig::new(config)
    })
}

/// 当前配置快照
pub fn current() -> Arc<SoundportConfig> {
    global().get()
}

/// 校验并安装新配置
///
/// 只影响之后创建的主机、缓冲区和流
pub fn install(config: SoundportConfig) -> ConfigResult<()> {
    config.validate()?;
    global().update(config);
    tracing::info!("Config installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SoundportConfig::default();

        assert_eq!(config.buffer.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.beep.frequency_hz, 440.0);
        assert_eq!(config.beep.amplitude, 0.5);
        assert_eq!(config.virtual_host.devices.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = SoundportConfig::default();

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: SoundportConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_partial_json() {
        // 缺失字段使用默认值填充
        let json = r#"{
            "beep": {
                "frequency_hz": 1000.0
            }
        }"#;

        let config: SoundportConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.beep.frequency_hz, 1000.0);
        assert_eq!(config.beep.amplitude, 0.5); // 默认值
        assert_eq!(config.buffer.capacity, DEFAULT_CAPACITY); // 默认值
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SoundportConfig::default();
        config.buffer.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SoundportConfig::default();
        config.beep.amplitude = 1.5;
        assert!(config.validate().is_err());

        let mut config = SoundportConfig::default();
        config.beep.frequency_hz = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = SoundportConfig::default();
        let duplicate = config.virtual_host.devices[0].clone();
        config.virtual_host.devices.push(duplicate);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_global_config_update() {
        let global = GlobalConfig::default();

        let mut new_config = SoundportConfig::default();
        new_config.buffer.capacity = 1024;
        global.update(new_config);

        assert_eq!(global.get().buffer.capacity, 1024);
    }

    #[test]
    fn test_install_rejects_invalid() {
        let mut config = SoundportConfig::default();
        config.virtual_host.period_frames = 0;
        assert!(install(config).is_err());
        assert!(current().virtual_host.period_frames > 0);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid("test error".to_string());
        assert!(err.to_string().contains("test error"));

        let err = ConfigError::Json(serde_json::from_str::<SoundportConfig>("invalid").unwrap_err());
        assert!(err.to_string().contains("JSON"));
    }
}
