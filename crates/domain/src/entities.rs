use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::value_objects::{
    CommandType, FailureStrategy, HistoryMarker, Host, Priority, TaskExecutionStatus,
    WorkflowExecutionStatus,
};

/// 条件分支任务，在Master本地执行
pub const TASK_TYPE_CONDITIONS: &str = "CONDITIONS";
pub const DEFAULT_WORKER_GROUP: &str = "default";

/// 发布后不可变的工作流定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub code: i64,
    pub version: i32,
    pub name: String,
    pub task_definitions: Vec<TaskDefinition>,
    pub relations: Vec<TaskRelation>,
    #[serde(default)]
    pub global_params: HashMap<String, String>,
}

impl WorkflowDefinition {
    pub fn task_definition(&self, name: &str) -> Option<&TaskDefinition> {
        self.task_definitions.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub code: i64,
    pub name: String,
    pub task_type: String,
    #[serde(default)]
    pub task_params: serde_json::Value,
    #[serde(default)]
    pub task_priority: Priority,
    #[serde(default = "default_worker_group")]
    pub worker_group: String,
    #[serde(default)]
    pub fail_retry_times: u32,
    #[serde(default)]
    pub fail_retry_interval_seconds: u64,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_worker_group() -> String {
    DEFAULT_WORKER_GROUP.to_string()
}

fn default_enabled() -> bool {
    true
}

impl TaskDefinition {
    pub fn new<S: Into<String>>(code: i64, name: S, task_type: S) -> Self {
        Self {
            code,
            name: name.into(),
            task_type: task_type.into(),
            task_params: serde_json::Value::Null,
            task_priority: Priority::default(),
            worker_group: default_worker_group(),
            fail_retry_times: 0,
            fail_retry_interval_seconds: 0,
            timeout_seconds: None,
            enabled: true,
        }
    }

    pub fn is_conditions(&self) -> bool {
        self.task_type == TASK_TYPE_CONDITIONS
    }

    /// 条件任务的分支配置，位于 task_params.condition_result
    pub fn condition_result(&self) -> Option<ConditionResult> {
        self.task_params
            .get("condition_result")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// 条件任务两条分支上的直接下游任务名
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionResult {
    #[serde(default)]
    pub success_node: Vec<String>,
    #[serde(default)]
    pub failed_node: Vec<String>,
}

/// 任务之间的依赖边，按任务名描述
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRelation {
    pub pre_task: String,
    pub post_task: String,
}

impl TaskRelation {
    pub fn new<S: Into<String>>(pre_task: S, post_task: S) -> Self {
        Self {
            pre_task: pre_task.into(),
            post_task: post_task.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: i64,
    pub name: String,
    pub workflow_definition_code: i64,
    pub workflow_definition_version: i32,
    pub state: WorkflowExecutionStatus,
    pub command_type: CommandType,
    /// 当前负责该实例的Master
    pub host: Option<Host>,
    pub priority: Priority,
    pub failure_strategy: FailureStrategy,
    pub schedule_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub restart_time: Option<DateTime<Utc>>,
    pub run_times: u32,
    pub failure_cause: Option<String>,
    pub history_marker: Option<HistoryMarker>,
    #[serde(default)]
    pub start_params: HashMap<String, String>,
}

impl WorkflowInstance {
    pub fn new(definition: &WorkflowDefinition, command_type: CommandType) -> Self {
        Self {
            id: 0,
            name: definition.name.clone(),
            workflow_definition_code: definition.code,
            workflow_definition_version: definition.version,
            state: WorkflowExecutionStatus::Submitted,
            command_type,
            host: None,
            priority: Priority::default(),
            failure_strategy: FailureStrategy::default(),
            schedule_time: None,
            start_time: None,
            end_time: None,
            restart_time: None,
            run_times: 0,
            failure_cause: None,
            history_marker: None,
            start_params: HashMap::new(),
        }
    }

    /// 用于容错判断的时间：重启时间优先，其次启动时间
    pub fn effective_start_time(&self) -> Option<DateTime<Utc>> {
        self.restart_time.or(self.start_time)
    }

    pub fn entity_description(&self) -> String {
        format!(
            "工作流实例 '{}' (ID: {}, 状态: {})",
            self.name, self.id, self.state
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: i64,
    pub name: String,
    pub task_code: i64,
    pub workflow_instance_id: i64,
    pub task_type: String,
    pub task_params: serde_json::Value,
    pub state: TaskExecutionStatus,
    pub host: Option<Host>,
    pub worker_group: String,
    pub task_priority: Priority,
    pub workflow_instance_priority: Priority,
    pub retry_times: u32,
    pub max_retry_times: u32,
    pub retry_interval_seconds: u64,
    pub timeout_seconds: Option<u64>,
    pub submit_time: DateTime<Utc>,
    pub dispatch_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// 任务拉起的外部应用ID，例如YARN application id
    #[serde(default)]
    pub app_ids: Vec<String>,
    pub failure_cause: Option<String>,
    /// 同一节点的多次尝试中只有最新一次有效
    pub valid: bool,
}

impl TaskInstance {
    pub fn from_definition(
        definition: &TaskDefinition,
        workflow_instance: &WorkflowInstance,
    ) -> Self {
        Self {
            id: 0,
            name: definition.name.clone(),
            task_code: definition.code,
            workflow_instance_id: workflow_instance.id,
            task_type: definition.task_type.clone(),
            task_params: definition.task_params.clone(),
            state: TaskExecutionStatus::Submitted,
            host: None,
            worker_group: definition.worker_group.clone(),
            task_priority: definition.task_priority,
            workflow_instance_priority: workflow_instance.priority,
            retry_times: 0,
            max_retry_times: definition.fail_retry_times,
            retry_interval_seconds: definition.fail_retry_interval_seconds,
            timeout_seconds: definition.timeout_seconds,
            submit_time: Utc::now(),
            dispatch_time: None,
            start_time: None,
            end_time: None,
            app_ids: Vec::new(),
            failure_cause: None,
            valid: true,
        }
    }

    /// 基于当前实例生成一次新的尝试（重试或容错），新实例ID由仓储分配
    pub fn new_attempt(&self, count_as_retry: bool) -> Self {
        let mut next = self.clone();
        next.id = 0;
        next.state = TaskExecutionStatus::Submitted;
        next.host = None;
        next.submit_time = Utc::now();
        next.dispatch_time = None;
        next.start_time = None;
        next.end_time = None;
        next.app_ids.clear();
        next.failure_cause = None;
        next.valid = true;
        if count_as_retry {
            next.retry_times += 1;
        }
        next
    }

    pub fn can_retry(&self) -> bool {
        self.state.is_failure() && self.retry_times < self.max_retry_times
    }

    pub fn is_conditions(&self) -> bool {
        self.task_type == TASK_TYPE_CONDITIONS
    }

    /// Worker容错比较使用的时间，未启动时使用提交时间
    pub fn effective_start_time(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or(self.submit_time)
    }
}

/// 待任意Master消费的命令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: i64,
    pub command_type: CommandType,
    pub workflow_definition_code: i64,
    pub workflow_definition_version: Option<i32>,
    /// 恢复类命令指向已有实例
    pub workflow_instance_id: Option<i64>,
    pub priority: Priority,
    pub failure_strategy: FailureStrategy,
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub command_params: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Command {
    pub fn new(command_type: CommandType, workflow_definition_code: i64) -> Self {
        Self {
            id: 0,
            command_type,
            workflow_definition_code,
            workflow_definition_version: None,
            workflow_instance_id: None,
            priority: Priority::default(),
            failure_strategy: FailureStrategy::default(),
            schedule_time: None,
            command_params: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn recover(command_type: CommandType, workflow_instance: &WorkflowInstance) -> Self {
        let mut command = Self::new(command_type, workflow_instance.workflow_definition_code);
        command.workflow_definition_version = Some(workflow_instance.workflow_definition_version);
        command.workflow_instance_id = Some(workflow_instance.id);
        command.priority = workflow_instance.priority;
        command.failure_strategy = workflow_instance.failure_strategy;
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> WorkflowDefinition {
        let mut cond = TaskDefinition::new(3, "cond", TASK_TYPE_CONDITIONS);
        cond.task_params = serde_json::json!({
            "condition_result": { "success_node": ["ok"], "failed_node": ["ko"] }
        });
        WorkflowDefinition {
            code: 100,
            version: 2,
            name: "wf".to_string(),
            task_definitions: vec![TaskDefinition::new(1, "a", "SHELL"), cond],
            relations: vec![TaskRelation::new("a", "cond")],
            global_params: HashMap::new(),
        }
    }

    #[test]
    fn test_condition_result_parsing() {
        let def = definition();
        let cond = def.task_definition("cond").unwrap();
        assert!(cond.is_conditions());
        let result = cond.condition_result().unwrap();
        assert_eq!(result.success_node, vec!["ok".to_string()]);
        assert_eq!(result.failed_node, vec!["ko".to_string()]);
        assert!(def.task_definition("a").unwrap().condition_result().is_none());
    }

    #[test]
    fn test_task_instance_new_attempt() {
        let def = definition();
        let mut wf = WorkflowInstance::new(&def, CommandType::StartWorkflow);
        wf.id = 7;
        let mut task_def = TaskDefinition::new(1, "a", "SHELL");
        task_def.fail_retry_times = 2;

        let mut task = TaskInstance::from_definition(&task_def, &wf);
        task.id = 11;
        task.state = TaskExecutionStatus::Failure;
        task.host = Some(Host::new("w1", 1234));
        assert!(task.can_retry());

        let retry = task.new_attempt(true);
        assert_eq!(retry.id, 0);
        assert_eq!(retry.retry_times, 1);
        assert_eq!(retry.state, TaskExecutionStatus::Submitted);
        assert!(retry.host.is_none());
        assert_eq!(retry.workflow_instance_id, 7);

        let failover = task.new_attempt(false);
        assert_eq!(failover.retry_times, 0);
    }

    #[test]
    fn test_task_definition_defaults_from_json() {
        let def: TaskDefinition =
            serde_json::from_str(r#"{"code": 1, "name": "a", "task_type": "SHELL"}"#).unwrap();
        assert!(def.enabled);
        assert_eq!(def.worker_group, DEFAULT_WORKER_GROUP);
        assert_eq!(def.task_priority, Priority::Medium);
    }

    #[test]
    fn test_recover_command() {
        let def = definition();
        let mut wf = WorkflowInstance::new(&def, CommandType::StartWorkflow);
        wf.id = 9;
        wf.priority = Priority::High;
        let command = Command::recover(CommandType::RecoverTolerantFault, &wf);
        assert_eq!(command.workflow_instance_id, Some(9));
        assert_eq!(command.workflow_definition_version, Some(2));
        assert_eq!(command.priority, Priority::High);
        assert!(command.command_type.is_recovery());
    }
}
