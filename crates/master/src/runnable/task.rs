use orchestrator_domain::{Priority, TaskExecutionStatus, TaskInstance};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

/// 任务实例的不可变身份与参数
#[derive(Debug, Clone)]
pub struct TaskExecutionContext {
    pub workflow_instance_id: i64,
    pub task_instance_id: i64,
    pub task_name: String,
    pub task_code: i64,
    pub task_type: String,
    pub task_params: serde_json::Value,
    pub worker_group: String,
    pub workflow_instance_priority: Priority,
    pub task_priority: Priority,
    pub timeout_seconds: Option<u64>,
}

impl From<&TaskInstance> for TaskExecutionContext {
    fn from(instance: &TaskInstance) -> Self {
        Self {
            workflow_instance_id: instance.workflow_instance_id,
            task_instance_id: instance.id,
            task_name: instance.name.clone(),
            task_code: instance.task_code,
            task_type: instance.task_type.clone(),
            task_params: instance.task_params.clone(),
            worker_group: instance.worker_group.clone(),
            workflow_instance_priority: instance.workflow_instance_priority,
            task_priority: instance.task_priority,
            timeout_seconds: instance.timeout_seconds,
        }
    }
}

/// 分发队列的排序键：工作流优先级、任务优先级、分发失败次数升序、任务实例ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPriorityKey {
    pub workflow_instance_priority: Priority,
    pub task_priority: Priority,
    pub dispatch_fail_times: u32,
    pub task_instance_id: i64,
}

/// 运行中的任务实例
pub struct TaskExecutionRunnable {
    context: TaskExecutionContext,
    instance: RwLock<TaskInstance>,
    dispatch_fail_times: AtomicU32,
}

impl TaskExecutionRunnable {
    pub fn new(instance: TaskInstance) -> Self {
        Self {
            context: TaskExecutionContext::from(&instance),
            instance: RwLock::new(instance),
            dispatch_fail_times: AtomicU32::new(0),
        }
    }

    pub fn context(&self) -> &TaskExecutionContext {
        &self.context
    }

    pub fn id(&self) -> i64 {
        self.context.task_instance_id
    }

    pub fn name(&self) -> &str {
        &self.context.task_name
    }

    pub fn workflow_instance_id(&self) -> i64 {
        self.context.workflow_instance_id
    }

    pub fn is_conditions(&self) -> bool {
        self.context.task_type == orchestrator_domain::TASK_TYPE_CONDITIONS
    }

    pub async fn snapshot(&self) -> TaskInstance {
        self.instance.read().await.clone()
    }

    pub async fn state(&self) -> TaskExecutionStatus {
        self.instance.read().await.state
    }

    pub async fn is_finished(&self) -> bool {
        self.state().await.is_finished()
    }

    pub async fn is_success(&self) -> bool {
        self.state().await.is_success()
    }

    /// 修改任务实例并返回修改后的副本，用于持久化
    pub async fn update<F>(&self, f: F) -> TaskInstance
    where
        F: FnOnce(&mut TaskInstance),
    {
        let mut instance = self.instance.write().await;
        f(&mut instance);
        instance.clone()
    }

    pub fn dispatch_fail_times(&self) -> u32 {
        self.dispatch_fail_times.load(Ordering::SeqCst)
    }

    pub fn increase_dispatch_fail_times(&self) -> u32 {
        self.dispatch_fail_times.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn priority_key(&self) -> TaskPriorityKey {
        TaskPriorityKey {
            workflow_instance_priority: self.context.workflow_instance_priority,
            task_priority: self.context.task_priority,
            dispatch_fail_times: self.dispatch_fail_times(),
            task_instance_id: self.context.task_instance_id,
        }
    }
}

impl std::fmt::Debug for TaskExecutionRunnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutionRunnable")
            .field("task_instance_id", &self.context.task_instance_id)
            .field("task_name", &self.context.task_name)
            .field("workflow_instance_id", &self.context.workflow_instance_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn task_instance(id: i64, name: &str) -> TaskInstance {
        TaskInstance {
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
            app_ids: vec![],
            failure_cause: None,
            valid: true,
        }
    }

    #[test]
    fn test_priority_key_ordering() {
        let mut high_wf = task_instance(5, "a");
        high_wf.workflow_instance_priority = Priority::High;
        let mut high_task = task_instance(1, "b");
        high_task.task_priority = Priority::Highest;
        let plain_early = task_instance(2, "c");
        let plain_late = task_instance(3, "d");

        let high_wf = TaskExecutionRunnable::new(high_wf);
        let high_task = TaskExecutionRunnable::new(high_task);
        let plain_early = TaskExecutionRunnable::new(plain_early);
        let plain_late = TaskExecutionRunnable::new(plain_late);

        // 工作流优先级先于任务优先级
        assert!(high_wf.priority_key() < high_task.priority_key());
        assert!(high_task.priority_key() < plain_early.priority_key());
        assert!(plain_early.priority_key() < plain_late.priority_key());

        // 分发失败次数多的排在后面
        plain_early.increase_dispatch_fail_times();
        assert!(plain_late.priority_key() < plain_early.priority_key());
    }

    #[tokio::test]
    async fn test_update_returns_snapshot() {
        let runnable = TaskExecutionRunnable::new(task_instance(1, "a"));
        let updated = runnable
            .update(|t| t.state = TaskExecutionStatus::Running)
            .await;
        assert_eq!(updated.state, TaskExecutionStatus::Running);
        assert_eq!(runnable.state().await, TaskExecutionStatus::Running);
        assert!(!runnable.is_finished().await);
    }
}
