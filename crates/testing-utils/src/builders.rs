//! 测试数据构建器
//!
//! 提供合理的默认值，只需修改测试关心的字段。

use chrono::{DateTime, Utc};
use orchestrator_domain::{
    HistoryMarker, Host, MasterHeartBeat, Priority, ServerStatus, TaskDefinition,
    TaskExecutionStatus, TaskInstance, TaskRelation, WorkerHeartBeat, WorkflowDefinition,
    WorkflowExecutionStatus, WorkflowInstance, CommandType, FailureStrategy,
    TASK_TYPE_CONDITIONS,
};
use std::collections::HashMap;

/// Builder for creating test WorkflowDefinition entities
pub struct WorkflowDefinitionBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowDefinitionBuilder {
    pub fn new(code: i64) -> Self {
        Self {
            definition: WorkflowDefinition {
                code,
                version: 1,
                name: format!("workflow_{code}"),
                task_definitions: Vec::new(),
                relations: Vec::new(),
                global_params: HashMap::new(),
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.definition.name = name.to_string();
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.definition.version = version;
        self
    }

    /// 追加一个SHELL任务，任务编码按添加顺序分配
    pub fn shell(self, name: &str) -> Self {
        let code = self.next_task_code();
        self.task(TaskDefinition::new(code, name, "SHELL"))
    }

    /// 追加一个条件任务
    pub fn conditions(self, name: &str, success_node: &[&str], failed_node: &[&str]) -> Self {
        let code = self.next_task_code();
        let mut task = TaskDefinition::new(code, name, TASK_TYPE_CONDITIONS);
        task.task_params = conditions_params(success_node, failed_node);
        self.task(task)
    }

    pub fn task(mut self, task: TaskDefinition) -> Self {
        self.definition.task_definitions.push(task);
        self
    }

    pub fn edge(mut self, pre_task: &str, post_task: &str) -> Self {
        self.definition
            .relations
            .push(TaskRelation::new(pre_task, post_task));
        self
    }

    pub fn global_param(mut self, key: &str, value: &str) -> Self {
        self.definition
            .global_params
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> WorkflowDefinition {
        self.definition
    }

    fn next_task_code(&self) -> i64 {
        self.definition.code * 1000 + self.definition.task_definitions.len() as i64 + 1
    }
}

/// 条件任务的参数
pub fn conditions_params(success_node: &[&str], failed_node: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "condition_result": {
            "success_node": success_node,
            "failed_node": failed_node,
        }
    })
}

/// Builder for creating test TaskDefinition entities
pub struct TaskDefinitionBuilder {
    task: TaskDefinition,
}

impl TaskDefinitionBuilder {
    pub fn new(code: i64, name: &str) -> Self {
        Self {
            task: TaskDefinition::new(code, name, "SHELL"),
        }
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self
    }

    pub fn with_worker_group(mut self, worker_group: &str) -> Self {
        self.task.worker_group = worker_group.to_string();
        self
    }

    pub fn with_retry(mut self, times: u32, interval_seconds: u64) -> Self {
        self.task.fail_retry_times = times;
        self.task.fail_retry_interval_seconds = interval_seconds;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.task.task_priority = priority;
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.task.task_params = params;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.enabled = false;
        self
    }

    pub fn build(self) -> TaskDefinition {
        self.task
    }
}

/// Builder for creating test WorkflowInstance entities
pub struct WorkflowInstanceBuilder {
    instance: WorkflowInstance,
}

impl WorkflowInstanceBuilder {
    pub fn new(id: i64, definition: &WorkflowDefinition) -> Self {
        let mut instance = WorkflowInstance::new(definition, CommandType::StartWorkflow);
        instance.id = id;
        Self { instance }
    }

    pub fn with_state(mut self, state: WorkflowExecutionStatus) -> Self {
        self.instance.state = state;
        self
    }

    pub fn with_host(mut self, host: Host) -> Self {
        self.instance.host = Some(host);
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.instance.start_time = Some(start_time);
        self
    }

    pub fn with_history_marker(mut self, marker: HistoryMarker) -> Self {
        self.instance.history_marker = Some(marker);
        self
    }

    pub fn with_failure_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.instance.failure_strategy = strategy;
        self
    }

    pub fn with_command_type(mut self, command_type: CommandType) -> Self {
        self.instance.command_type = command_type;
        self
    }

    pub fn build(self) -> WorkflowInstance {
        self.instance
    }
}

/// Builder for creating test TaskInstance entities
pub struct TaskInstanceBuilder {
    instance: TaskInstance,
}

impl TaskInstanceBuilder {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            instance: TaskInstance {
                id,
                name: name.to_string(),
                task_code: id,
                workflow_instance_id: 1,
                task_type: "SHELL".to_string(),
                task_params: serde_json::Value::Null,
                state: TaskExecutionStatus::Submitted,
                host: None,
                worker_group: "default".to_string(),
                task_priority: Priority::Medium,
                workflow_instance_priority: Priority::Medium,
                retry_times: 0,
                max_retry_times: 0,
                retry_interval_seconds: 0,
                timeout_seconds: None,
                submit_time: Utc::now(),
                dispatch_time: None,
                start_time: None,
                end_time: None,
                app_ids: Vec::new(),
                failure_cause: None,
                valid: true,
            },
        }
    }

    pub fn with_workflow_instance_id(mut self, workflow_instance_id: i64) -> Self {
        self.instance.workflow_instance_id = workflow_instance_id;
        self
    }

    pub fn with_task_code(mut self, task_code: i64) -> Self {
        self.instance.task_code = task_code;
        self
    }

    pub fn with_state(mut self, state: TaskExecutionStatus) -> Self {
        self.instance.state = state;
        self
    }

    pub fn with_host(mut self, host: Host) -> Self {
        self.instance.host = Some(host);
        self
    }

    pub fn with_submit_time(mut self, submit_time: DateTime<Utc>) -> Self {
        self.instance.submit_time = submit_time;
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.instance.start_time = Some(start_time);
        self
    }

    pub fn with_app_ids(mut self, app_ids: &[&str]) -> Self {
        self.instance.app_ids = app_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> TaskInstance {
        self.instance
    }
}

/// Builder for creating test WorkerHeartBeat entities
pub struct WorkerHeartBeatBuilder {
    heartbeat: WorkerHeartBeat,
}

impl WorkerHeartBeatBuilder {
    pub fn new(ip: &str, port: u16) -> Self {
        let now = Utc::now();
        Self {
            heartbeat: WorkerHeartBeat {
                host: ip.to_string(),
                port,
                process_id: 1,
                startup_time: now,
                report_time: now,
                cpu_usage: 0.1,
                memory_usage: 0.1,
                load_average: 0.1,
                server_status: ServerStatus::Normal,
                worker_group: "default".to_string(),
                worker_weight: 100,
                waiting_task_count: 0,
            },
        }
    }

    pub fn with_group(mut self, worker_group: &str) -> Self {
        self.heartbeat.worker_group = worker_group.to_string();
        self
    }

    pub fn with_status(mut self, status: ServerStatus) -> Self {
        self.heartbeat.server_status = status;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.heartbeat.worker_weight = weight;
        self
    }

    pub fn with_usage(mut self, cpu: f64, memory: f64, load: f64) -> Self {
        self.heartbeat.cpu_usage = cpu;
        self.heartbeat.memory_usage = memory;
        self.heartbeat.load_average = load;
        self
    }

    pub fn with_waiting_tasks(mut self, count: u32) -> Self {
        self.heartbeat.waiting_task_count = count;
        self
    }

    pub fn with_startup_time(mut self, startup_time: DateTime<Utc>) -> Self {
        self.heartbeat.startup_time = startup_time;
        self
    }

    pub fn build(self) -> WorkerHeartBeat {
        self.heartbeat
    }
}

/// Builder for creating test MasterHeartBeat entities
pub struct MasterHeartBeatBuilder {
    heartbeat: MasterHeartBeat,
}

impl MasterHeartBeatBuilder {
    pub fn new(ip: &str, port: u16) -> Self {
        let now = Utc::now();
        Self {
            heartbeat: MasterHeartBeat {
                host: ip.to_string(),
                port,
                process_id: 1,
                startup_time: now,
                report_time: now,
                cpu_usage: 0.1,
                memory_usage: 0.1,
                load_average: 0.1,
                server_status: ServerStatus::Normal,
            },
        }
    }

    pub fn with_startup_time(mut self, startup_time: DateTime<Utc>) -> Self {
        self.heartbeat.startup_time = startup_time;
        self
    }

    pub fn with_report_time(mut self, report_time: DateTime<Utc>) -> Self {
        self.heartbeat.report_time = report_time;
        self
    }

    pub fn build(self) -> MasterHeartBeat {
        self.heartbeat
    }
}
