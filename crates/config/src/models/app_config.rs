use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    master_dispatch::{DispatchConfig, MasterConfig},
    registry_failover::{FailoverConfig, RegistryConfig},
};
use crate::validation::ConfigValidator;

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/orchestrator.toml",
    "orchestrator.toml",
    "/etc/orchestrator/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub master: MasterConfig,
    pub dispatch: DispatchConfig,
    pub registry: RegistryConfig,
    pub failover: FailoverConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 按 默认值 -> 配置文件 -> ORCHESTRATOR__* 环境变量 的顺序加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default())
            .context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        match config_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(anyhow::anyhow!("配置文件不存在: {}", path));
                }
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
            None => {
                if let Some(path) = DEFAULT_CONFIG_PATHS
                    .iter()
                    .find(|path| Path::new(path).exists())
                {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("加载配置失败")?
            .try_deserialize()
            .context("解析配置失败")?;

        config.validate().context("配置验证失败")?;
        Ok(config)
    }

    /// 从TOML字符串解析，缺省字段使用默认值
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content).context("解析TOML配置失败")?;
        config.validate().context("配置验证失败")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.master.validate()?;
        self.dispatch.validate()?;
        self.registry.validate()?;
        self.failover.validate()?;
        self.api.validate()?;
        self.observability.validate()?;

        if self.registry.heartbeat_timeout_seconds <= self.master.heartbeat_interval_seconds {
            return Err(crate::ConfigError::Validation(
                "registry.heartbeat_timeout_seconds must be greater than master.heartbeat_interval_seconds"
                    .to_string(),
            ));
        }
        // Worker按Master注册的地址回调，API必须监听在该端口上
        if self.api.enabled {
            let port = self
                .api
                .bind_address
                .rsplit(':')
                .next()
                .and_then(|port| port.parse::<u16>().ok());
            if port != Some(self.master.listen_port) {
                return Err(crate::ConfigError::Validation(format!(
                    "api.bind_address {} must listen on master.listen_port {}",
                    self.api.bind_address, self.master.listen_port
                )));
            }
        }
        Ok(())
    }
}
