use crate::ConfigResult;

/// 配置段自校验
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// 通用字段校验
pub struct ValidationUtils;

impl ValidationUtils {
    /// 非空字符串
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// 端口不能为0
    pub fn validate_port(port: u16, field_name: &str) -> ConfigResult<()> {
        if port == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be 0"
            )));
        }
        Ok(())
    }

    /// 超时在 1..=3600 秒之间
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        if timeout_seconds == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout_seconds > 3600 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 3600"
            )));
        }
        Ok(())
    }

    /// 数量在 1..=max 之间
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// 形如 host:port 的地址
    pub fn validate_socket_address(value: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(value, field_name)?;
        match value.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
            _ => Err(crate::ConfigError::Validation(format!(
                "{field_name} must be in host:port format, got {value}"
            ))),
        }
    }

    /// 带协议头的URL
    pub fn validate_url(url: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(url, field_name)?;
        if !url.contains("://") {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be a valid URL with protocol"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("test", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("", "field").is_err());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_timeout_seconds() {
        assert!(ValidationUtils::validate_timeout_seconds(30, "t").is_ok());
        assert!(ValidationUtils::validate_timeout_seconds(3600, "t").is_ok());
        assert!(ValidationUtils::validate_timeout_seconds(0, "t").is_err());
        assert!(ValidationUtils::validate_timeout_seconds(3601, "t").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(1, "c", 10).is_ok());
        assert!(ValidationUtils::validate_count(10, "c", 10).is_ok());
        assert!(ValidationUtils::validate_count(0, "c", 10).is_err());
        assert!(ValidationUtils::validate_count(11, "c", 10).is_err());
    }

    #[test]
    fn test_validate_socket_address() {
        assert!(ValidationUtils::validate_socket_address("0.0.0.0:5679", "a").is_ok());
        assert!(ValidationUtils::validate_socket_address("localhost:80", "a").is_ok());
        assert!(ValidationUtils::validate_socket_address("localhost", "a").is_err());
        assert!(ValidationUtils::validate_socket_address(":80", "a").is_err());
        assert!(ValidationUtils::validate_socket_address("host:port", "a").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(ValidationUtils::validate_url("http://rm:8088", "url").is_ok());
        assert!(ValidationUtils::validate_url("rm:8088", "url").is_err());
    }
}
