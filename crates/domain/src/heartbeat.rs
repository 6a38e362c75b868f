//! 注册中心中的心跳记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Host;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    #[default]
    Normal,
    Busy,
    Abnormal,
}

impl ServerStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, ServerStatus::Normal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterHeartBeat {
    pub host: String,
    pub port: u16,
    pub process_id: u32,
    pub startup_time: DateTime<Utc>,
    pub report_time: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub load_average: f64,
    pub server_status: ServerStatus,
}

impl MasterHeartBeat {
    pub fn address(&self) -> Host {
        Host::new(self.host.clone(), self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerHeartBeat {
    pub host: String,
    pub port: u16,
    pub process_id: u32,
    pub startup_time: DateTime<Utc>,
    pub report_time: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub load_average: f64,
    pub server_status: ServerStatus,
    pub worker_group: String,
    /// 配置的权重，默认100
    pub worker_weight: u32,
    pub waiting_task_count: u32,
}

impl WorkerHeartBeat {
    pub fn address(&self) -> Host {
        Host::new(self.host.clone(), self.port)
    }
}
