//! 状态管理模块
//!
//! # 模块结构
//!
//! - `config` - 配置加载、保存与进程级配置实例

pub mod config;

pub use config::{
    BeepConfig, BufferConfig, ConfigError, ConfigManager, ConfigResult, GlobalConfig,
    SoundportConfig,
};
