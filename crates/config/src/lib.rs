//! Master配置
//!
//! 默认值、TOML配置文件与 `ORCHESTRATOR__*` 环境变量三层合并，
//! 每个配置段各自实现 [`ConfigValidator`]。

pub mod models;
pub mod validation;

pub use models::{
    ApiConfig, AppConfig, DispatchConfig, FailoverConfig, HostSelectorType, LogFormat,
    MasterConfig, ObservabilityConfig, RegistryConfig,
};
pub use validation::{ConfigValidator, ValidationUtils};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置校验失败: {0}")]
    Validation(String),

    #[error("配置解析失败: {0}")]
    Parse(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
