use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 心跳超过该时间未刷新视为过期注册
    pub heartbeat_timeout_seconds: u64,
    /// 扫描并删除过期注册的间隔
    pub expiry_check_interval_ms: u64,
    pub lock_retry_times: u32,
    pub lock_retry_interval_ms: u64,
    /// 注册中心变更订阅通道容量
    pub subscription_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_seconds: 60,
            expiry_check_interval_ms: 5000,
            lock_retry_times: 10,
            lock_retry_interval_ms: 500,
            subscription_capacity: 1024,
        }
    }
}

impl ConfigValidator for RegistryConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.heartbeat_timeout_seconds,
            "registry.heartbeat_timeout_seconds",
        )?;
        if self.expiry_check_interval_ms == 0 {
            return Err(crate::ConfigError::Validation(
                "registry.expiry_check_interval_ms must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_count(
            self.lock_retry_times as usize,
            "registry.lock_retry_times",
            1000,
        )?;
        ValidationUtils::validate_count(
            self.subscription_capacity,
            "registry.subscription_capacity",
            1_000_000,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    pub enabled: bool,
    /// 容错时是否尝试终止任务拉起的YARN应用
    pub kill_yarn_job_when_failover: bool,
    pub yarn_resource_manager_url: Option<String>,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kill_yarn_job_when_failover: true,
            yarn_resource_manager_url: None,
        }
    }
}

impl ConfigValidator for FailoverConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if let Some(url) = &self.yarn_resource_manager_url {
            ValidationUtils::validate_url(url, "failover.yarn_resource_manager_url")?;
        }
        Ok(())
    }
}
