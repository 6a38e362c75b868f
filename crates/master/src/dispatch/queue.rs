use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::runnable::{TaskExecutionRunnable, TaskPriorityKey};

struct ReadyEntry {
    key: TaskPriorityKey,
    runnable: Arc<TaskExecutionRunnable>,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ReadyEntry {}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

struct DelayedEntry {
    ready_at: Instant,
    entry: ReadyEntry,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.entry == other.entry
    }
}

impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ready_at
            .cmp(&other.ready_at)
            .then_with(|| self.entry.cmp(&other.entry))
    }
}

#[derive(Default)]
struct QueueInner {
    ready: BinaryHeap<Reverse<ReadyEntry>>,
    delayed: BinaryHeap<Reverse<DelayedEntry>>,
}

impl QueueInner {
    /// 把到期的延迟任务移入就绪堆
    fn promote(&mut self, now: Instant) {
        while let Some(Reverse(head)) = self.delayed.peek() {
            if head.ready_at > now {
                break;
            }
            if let Some(Reverse(due)) = self.delayed.pop() {
                self.ready.push(Reverse(due.entry));
            }
        }
    }
}

/// 带延迟的任务分发优先队列
///
/// 就绪任务按 `TaskPriorityKey` 出队；延迟任务到期前不可见。
#[derive(Default)]
pub struct TaskDispatchQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl TaskDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, runnable: Arc<TaskExecutionRunnable>, delay: Duration) {
        let entry = ReadyEntry {
            key: runnable.priority_key(),
            runnable,
        };
        {
            let mut inner = self.inner.lock().await;
            if delay.is_zero() {
                inner.ready.push(Reverse(entry));
            } else {
                inner.delayed.push(Reverse(DelayedEntry {
                    ready_at: Instant::now() + delay,
                    entry,
                }));
            }
        }
        self.notify.notify_one();
    }

    /// 等待并取出下一个就绪任务
    pub async fn take(&self) -> Arc<TaskExecutionRunnable> {
        loop {
            let next_ready_at = {
                let mut inner = self.inner.lock().await;
                inner.promote(Instant::now());
                if let Some(Reverse(entry)) = inner.ready.pop() {
                    return entry.runnable;
                }
                inner.delayed.peek().map(|Reverse(head)| head.ready_at)
            };

            match next_ready_at {
                Some(ready_at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(ready_at) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// 非阻塞地取出就绪任务
    pub async fn poll_ready(&self) -> Option<Arc<TaskExecutionRunnable>> {
        let mut inner = self.inner.lock().await;
        inner.promote(Instant::now());
        inner.ready.pop().map(|Reverse(entry)| entry.runnable)
    }

    /// 撤回尚未分发的任务
    pub async fn remove(&self, task_instance_id: i64) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.ready.len() + inner.delayed.len();
        inner
            .ready
            .retain(|Reverse(e)| e.key.task_instance_id != task_instance_id);
        inner
            .delayed
            .retain(|Reverse(e)| e.entry.key.task_instance_id != task_instance_id);
        before != inner.ready.len() + inner.delayed.len()
    }

    pub async fn contains(&self, task_instance_id: i64) -> bool {
        let inner = self.inner.lock().await;
        inner
            .ready
            .iter()
            .any(|Reverse(e)| e.key.task_instance_id == task_instance_id)
            || inner
                .delayed
                .iter()
                .any(|Reverse(e)| e.entry.key.task_instance_id == task_instance_id)
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.ready.len() + inner.delayed.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchestrator_domain::{Priority, TaskExecutionStatus, TaskInstance};

    fn runnable(id: i64, workflow_priority: Priority, task_priority: Priority) -> Arc<TaskExecutionRunnable> {
        Arc::new(TaskExecutionRunnable::new(TaskInstance {
            id,
            name: format!("t{id}"),
            task_code: id,
            workflow_instance_id: 1,
            task_type: "SHELL".to_string(),
            task_params: serde_json::Value::Null,
            state: TaskExecutionStatus::Submitted,
            host: None,
            worker_group: "default".to_string(),
            task_priority,
            workflow_instance_priority: workflow_priority,
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
        }))
    }

    #[tokio::test]
    async fn test_priority_order() {
        let queue = TaskDispatchQueue::new();
        queue
            .push(runnable(3, Priority::Medium, Priority::Medium), Duration::ZERO)
            .await;
        queue
            .push(runnable(2, Priority::Medium, Priority::High), Duration::ZERO)
            .await;
        queue
            .push(runnable(9, Priority::Highest, Priority::Lowest), Duration::ZERO)
            .await;
        queue
            .push(runnable(1, Priority::Medium, Priority::Medium), Duration::ZERO)
            .await;

        let order: Vec<i64> = vec![
            queue.take().await.id(),
            queue.take().await.id(),
            queue.take().await.id(),
            queue.take().await.id(),
        ];
        assert_eq!(order, vec![9, 2, 1, 3]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_entry_waits() {
        let queue = Arc::new(TaskDispatchQueue::new());
        queue
            .push(runnable(1, Priority::Medium, Priority::Medium), Duration::from_secs(5))
            .await;
        assert!(queue.poll_ready().await.is_none());
        assert_eq!(queue.len().await, 1);

        let start = Instant::now();
        let taken = queue.take().await;
        assert_eq!(taken.id(), 1);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_take_wakes_on_push() {
        let queue = Arc::new(TaskDispatchQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.take().await.id() })
        };
        tokio::task::yield_now().await;
        queue
            .push(runnable(7, Priority::Medium, Priority::Medium), Duration::ZERO)
            .await;
        assert_eq!(consumer.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_remove_withdraws_task() {
        let queue = TaskDispatchQueue::new();
        queue
            .push(runnable(1, Priority::Medium, Priority::Medium), Duration::ZERO)
            .await;
        queue
            .push(runnable(2, Priority::Medium, Priority::Medium), Duration::from_secs(60))
            .await;

        assert!(queue.contains(2).await);
        assert!(queue.remove(2).await);
        assert!(!queue.remove(2).await);
        assert!(queue.remove(1).await);
        assert!(queue.is_empty().await);
    }
}
