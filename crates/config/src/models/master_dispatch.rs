use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// 对外公布的主机地址，为空时使用本机hostname
    pub advertise_host: Option<String>,
    pub listen_port: u16,
    /// 并行处理工作流事件的最大数量
    pub exec_threads: usize,
    /// 任务分发池大小
    pub dispatch_pool_size: usize,
    pub heartbeat_interval_seconds: u64,
    /// 运行中工作流超过该值时Master上报BUSY
    pub max_running_workflows: usize,
    pub command_fetch_interval_ms: u64,
    pub command_fetch_batch_size: usize,
    /// 停止/暂停时等待在途任务确认的最长时间
    pub stop_wait_timeout_seconds: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            advertise_host: None,
            listen_port: 5678,
            exec_threads: 100,
            dispatch_pool_size: 100,
            heartbeat_interval_seconds: 10,
            max_running_workflows: 1000,
            command_fetch_interval_ms: 1000,
            command_fetch_batch_size: 10,
            stop_wait_timeout_seconds: 60,
        }
    }
}

impl ConfigValidator for MasterConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if let Some(host) = &self.advertise_host {
            ValidationUtils::validate_not_empty(host, "master.advertise_host")?;
        }
        ValidationUtils::validate_port(self.listen_port, "master.listen_port")?;
        ValidationUtils::validate_count(self.exec_threads, "master.exec_threads", 10000)?;
        ValidationUtils::validate_count(
            self.dispatch_pool_size,
            "master.dispatch_pool_size",
            10000,
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.heartbeat_interval_seconds,
            "master.heartbeat_interval_seconds",
        )?;
        ValidationUtils::validate_count(
            self.max_running_workflows,
            "master.max_running_workflows",
            1_000_000,
        )?;
        if self.command_fetch_interval_ms == 0 {
            return Err(crate::ConfigError::Validation(
                "master.command_fetch_interval_ms must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_count(
            self.command_fetch_batch_size,
            "master.command_fetch_batch_size",
            1000,
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.stop_wait_timeout_seconds,
            "master.stop_wait_timeout_seconds",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostSelectorType {
    Random,
    LowerWeight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub host_selector: HostSelectorType,
    /// 对同一台Worker的最大发送次数
    pub max_send_attempts: u32,
    pub send_retry_interval_ms: u64,
    pub send_timeout_ms: u64,
    /// 超过该次数的分发失败后任务实例直接失败
    pub max_dispatch_failures: u32,
    pub dispatch_failed_backoff_ms: u64,
    pub worker_refresh_interval_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            host_selector: HostSelectorType::LowerWeight,
            max_send_attempts: 3,
            send_retry_interval_ms: 100,
            send_timeout_ms: 5000,
            max_dispatch_failures: 30,
            dispatch_failed_backoff_ms: 1000,
            worker_refresh_interval_seconds: 30,
        }
    }
}

impl ConfigValidator for DispatchConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(
            self.max_send_attempts as usize,
            "dispatch.max_send_attempts",
            10,
        )?;
        if self.send_timeout_ms == 0 {
            return Err(crate::ConfigError::Validation(
                "dispatch.send_timeout_ms must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_count(
            self.max_dispatch_failures as usize,
            "dispatch.max_dispatch_failures",
            10000,
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.worker_refresh_interval_seconds,
            "dispatch.worker_refresh_interval_seconds",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_config_validation() {
        let config = MasterConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.exec_threads = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.advertise_host = Some("  ".to_string());
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.listen_port = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_dispatch_config_validation() {
        let config = DispatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_send_attempts, 3);
        assert_eq!(config.send_retry_interval_ms, 100);

        let mut invalid = config.clone();
        invalid.max_send_attempts = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.send_timeout_ms = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_host_selector_serialization() {
        let json = serde_json::to_string(&HostSelectorType::LowerWeight).unwrap();
        assert_eq!(json, "\"lower_weight\"");
        let parsed: HostSelectorType = serde_json::from_str("\"random\"").unwrap();
        assert_eq!(parsed, HostSelectorType::Random);
    }
}
