pub mod api_observability;
pub mod app_config;
pub mod master_dispatch;
pub mod registry_failover;

pub use api_observability::*;
pub use app_config::*;
pub use master_dispatch::*;
pub use registry_failover::*;
