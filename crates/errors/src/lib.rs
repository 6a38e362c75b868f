use thiserror::Error;

/// 编排系统统一错误类型
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("工作流定义未找到: {code}")]
    WorkflowDefinitionNotFound { code: i64 },
    #[error("工作流实例未找到: {id}")]
    WorkflowInstanceNotFound { id: i64 },
    #[error("任务实例未找到: {id}")]
    TaskInstanceNotFound { id: i64 },
    #[error("工作流实例 {id} 不在当前Master上运行")]
    WorkflowNotRunningHere { id: i64 },
    #[error("工作流实例 {id} 已存在于运行仓库中")]
    WorkflowAlreadyRunning { id: i64 },
    #[error("Worker分组未找到: {group}")]
    WorkerGroupNotFound { group: String },
    #[error("Worker分组 {group} 暂无可用Worker")]
    NoAvailableWorker { group: String },
    #[error("任务实例 {task_instance_id} 分发失败: 候选Worker已耗尽")]
    DispatchCandidatesExhausted { task_instance_id: i64 },
    #[error("Worker {host} 拒绝任务: {reason}")]
    DispatchRejected { host: String, reason: String },
    #[error("检测到循环依赖")]
    CircularDependency,
    #[error("无效的DAG: {0}")]
    InvalidDag(String),
    #[error("非法的状态转换: {0}")]
    IllegalStateTransition(String),
    #[error("注册中心错误: {0}")]
    Registry(String),
    #[error("获取分布式锁超时: {path}")]
    LockTimeout { path: String },
    #[error("仓储操作错误: {0}")]
    Repository(String),
    #[error("事件总线已关闭: 工作流实例 {workflow_instance_id}")]
    EventBusClosed { workflow_instance_id: i64 },
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("无效的请求参数: {0}")]
    InvalidArgument(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn workflow_instance_not_found(id: i64) -> Self {
        Self::WorkflowInstanceNotFound { id }
    }
    pub fn task_instance_not_found(id: i64) -> Self {
        Self::TaskInstanceNotFound { id }
    }
    pub fn worker_group_not_found<S: Into<String>>(group: S) -> Self {
        Self::WorkerGroupNotFound {
            group: group.into(),
        }
    }
    pub fn registry<S: Into<String>>(msg: S) -> Self {
        Self::Registry(msg.into())
    }
    pub fn repository<S: Into<String>>(msg: S) -> Self {
        Self::Repository(msg.into())
    }
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn illegal_transition<S: Into<String>>(msg: S) -> Self {
        Self::IllegalStateTransition(msg.into())
    }
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Internal(_) | OrchestratorError::Configuration(_)
        )
    }
    /// 可重试的错误：调用方应当稍后重新排队，而不是让工作流失败
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Network(_)
                | OrchestratorError::Timeout(_)
                | OrchestratorError::LockTimeout { .. }
                | OrchestratorError::Registry(_)
                | OrchestratorError::WorkerGroupNotFound { .. }
                | OrchestratorError::NoAvailableWorker { .. }
                | OrchestratorError::DispatchCandidatesExhausted { .. }
        )
    }
    /// Worker侧的失败（网络不通或拒绝），分发器应换一台Worker重试
    pub fn is_host_failure(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Network(_)
                | OrchestratorError::Timeout(_)
                | OrchestratorError::DispatchRejected { .. }
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            OrchestratorError::WorkflowInstanceNotFound { .. } => "请求的工作流实例不存在",
            OrchestratorError::TaskInstanceNotFound { .. } => "请求的任务实例不存在",
            OrchestratorError::WorkflowDefinitionNotFound { .. } => "请求的工作流定义不存在",
            OrchestratorError::WorkflowNotRunningHere { .. } => "工作流实例不在当前Master上运行",
            OrchestratorError::InvalidArgument(_) => "请求参数有误",
            OrchestratorError::IllegalStateTransition(_) => "当前状态不允许该操作",
            OrchestratorError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
