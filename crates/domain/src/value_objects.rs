use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 优先级，数值越小越优先
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Highest = 0,
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
    Lowest = 4,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowExecutionStatus {
    Submitted,
    Running,
    ReadyPause,
    Paused,
    ReadyStop,
    Stopped,
    Failure,
    Success,
    /// 原Master失效，等待其他Master接管
    Failover,
}

impl WorkflowExecutionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Paused | Self::Stopped | Self::Failure | Self::Success
        )
    }

    /// Master失效时需要被接管的状态
    pub fn need_failover(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Running | Self::ReadyPause | Self::ReadyStop
        )
    }
}

impl fmt::Display for WorkflowExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::ReadyPause => "READY_PAUSE",
            Self::Paused => "PAUSED",
            Self::ReadyStop => "READY_STOP",
            Self::Stopped => "STOPPED",
            Self::Failure => "FAILURE",
            Self::Success => "SUCCESS",
            Self::Failover => "FAILOVER",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskExecutionStatus {
    Submitted,
    Dispatched,
    Running,
    Paused,
    Killed,
    Failure,
    Success,
    NeedFaultTolerance,
    ForcedSuccess,
}

impl TaskExecutionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Paused | Self::Killed | Self::Failure | Self::Success | Self::ForcedSuccess
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::ForcedSuccess)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::Killed)
    }

    /// 已经交给Worker但尚未结束
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Dispatched | Self::Running)
    }

    /// Worker失效时需要容错的状态
    pub fn need_failover(&self) -> bool {
        matches!(self, Self::Submitted | Self::Dispatched | Self::Running)
    }
}

impl fmt::Display for TaskExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "SUBMITTED",
            Self::Dispatched => "DISPATCHED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Killed => "KILLED",
            Self::Failure => "FAILURE",
            Self::Success => "SUCCESS",
            Self::NeedFaultTolerance => "NEED_FAULT_TOLERANCE",
            Self::ForcedSuccess => "FORCED_SUCCESS",
        };
        write!(f, "{s}")
    }
}

/// 任务失败后工作流的处理方式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStrategy {
    /// 停止派发并终止在途任务，随后工作流失败
    #[default]
    End,
    /// 继续运行其余独立分支，全部结束后工作流失败
    Continue,
}

/// 带有历史标记的工作流实例不参与容错
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryMarker {
    Terminal,
    NoOp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    StartWorkflow,
    Scheduler,
    Backfill,
    RepeatRunning,
    RecoverFromFailure,
    RecoverSuspended,
    RecoverTolerantFault,
}

impl CommandType {
    /// 恢复类命令复用已有的工作流实例
    pub fn is_recovery(&self) -> bool {
        matches!(
            self,
            Self::RepeatRunning
                | Self::RecoverFromFailure
                | Self::RecoverSuspended
                | Self::RecoverTolerantFault
        )
    }
}

/// 服务地址 ip:port
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Host {
    pub ip: String,
    pub port: u16,
}

impl Host {
    pub fn new<S: Into<String>>(ip: S, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    pub fn address(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for Host {
    type Err = orchestrator_errors::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s.trim().rsplit_once(':').ok_or_else(|| {
            orchestrator_errors::OrchestratorError::invalid_argument(format!(
                "无效的地址: {s}"
            ))
        })?;
        if ip.is_empty() {
            return Err(orchestrator_errors::OrchestratorError::invalid_argument(
                format!("无效的地址: {s}"),
            ));
        }
        let port = port.parse::<u16>().map_err(|_| {
            orchestrator_errors::OrchestratorError::invalid_argument(format!(
                "无效的端口: {s}"
            ))
        })?;
        Ok(Host::new(ip, port))
    }
}

impl TryFrom<String> for Host {
    type Error = orchestrator_errors::OrchestratorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Host> for String {
    fn from(host: Host) -> Self {
        host.to_string()
    }
}
