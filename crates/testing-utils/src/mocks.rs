//! Worker侧调用的mock实现
//!
//! 记录每次调用，并可按地址配置失败或拒绝，用于在不启动Worker的情况下
//! 驱动Master引擎。

use async_trait::async_trait;
use orchestrator_domain::{
    ExternalJobCleaner, Host, TakeOverRequest, TaskDispatchRequest, TaskExecutorClient,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorCall {
    Dispatch { host: Host, task_instance_id: i64 },
    Kill { host: Host, task_instance_id: i64 },
    Pause { host: Host, task_instance_id: i64 },
    TakeOver { host: Host, task_instance_id: i64 },
}

/// 分发请求被接收前执行的回调，模拟Worker在返回确认前就开始回报
pub type DispatchHook = Arc<
    dyn Fn(Host, TaskDispatchRequest) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Mock implementation of TaskExecutorClient for testing
#[derive(Clone)]
pub struct MockTaskExecutorClient {
    calls: Arc<Mutex<Vec<ExecutorCall>>>,
    failing_hosts: Arc<Mutex<HashSet<Host>>>,
    rejecting_hosts: Arc<Mutex<HashSet<Host>>>,
    take_over_accepted: Arc<Mutex<bool>>,
    dispatch_hook: Arc<Mutex<Option<DispatchHook>>>,
}

impl fmt::Debug for MockTaskExecutorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTaskExecutorClient")
            .field("calls", &self.calls)
            .field("failing_hosts", &self.failing_hosts)
            .field("rejecting_hosts", &self.rejecting_hosts)
            .finish_non_exhaustive()
    }
}

impl MockTaskExecutorClient {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failing_hosts: Arc::new(Mutex::new(HashSet::new())),
            rejecting_hosts: Arc::new(Mutex::new(HashSet::new())),
            take_over_accepted: Arc::new(Mutex::new(true)),
            dispatch_hook: Arc::new(Mutex::new(None)),
        }
    }

    /// 每次成功接收分发请求时，在返回之前先执行 `hook`
    pub fn on_dispatch<F, Fut>(&self, hook: F)
    where
        F: Fn(Host, TaskDispatchRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: DispatchHook = Arc::new(move |host, request| Box::pin(hook(host, request)));
        *self.dispatch_hook.lock().unwrap() = Some(hook);
    }

    /// 发往该地址的请求均返回网络错误
    pub fn fail_host(&self, host: &Host) {
        self.failing_hosts.lock().unwrap().insert(host.clone());
    }

    pub fn recover_host(&self, host: &Host) {
        self.failing_hosts.lock().unwrap().remove(host);
    }

    /// 该地址上的Worker拒绝接收任务
    pub fn reject_host(&self, host: &Host) {
        self.rejecting_hosts.lock().unwrap().insert(host.clone());
    }

    pub fn set_take_over_accepted(&self, accepted: bool) {
        *self.take_over_accepted.lock().unwrap() = accepted;
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// 成功或失败的分发调用，按调用顺序
    pub fn dispatch_calls(&self) -> Vec<(Host, i64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ExecutorCall::Dispatch {
                    host,
                    task_instance_id,
                } => Some((host, task_instance_id)),
                _ => None,
            })
            .collect()
    }

    pub fn dispatch_count_to(&self, host: &Host) -> usize {
        self.dispatch_calls()
            .iter()
            .filter(|(h, _)| h == host)
            .count()
    }

    pub fn killed_task_ids(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ExecutorCall::Kill {
                    task_instance_id, ..
                } => Some(task_instance_id),
                _ => None,
            })
            .collect()
    }

    pub fn paused_task_ids(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ExecutorCall::Pause {
                    task_instance_id, ..
                } => Some(task_instance_id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ExecutorCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_reachable(&self, host: &Host) -> OrchestratorResult<()> {
        if self.failing_hosts.lock().unwrap().contains(host) {
            return Err(OrchestratorError::network(format!("无法连接到 {host}")));
        }
        Ok(())
    }
}

impl Default for MockTaskExecutorClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskExecutorClient for MockTaskExecutorClient {
    async fn dispatch_task(
        &self,
        host: &Host,
        request: &TaskDispatchRequest,
    ) -> OrchestratorResult<()> {
        self.record(ExecutorCall::Dispatch {
            host: host.clone(),
            task_instance_id: request.task_instance.id,
        });
        self.check_reachable(host)?;
        if self.rejecting_hosts.lock().unwrap().contains(host) {
            return Err(OrchestratorError::DispatchRejected {
                host: host.to_string(),
                reason: "Worker队列已满".to_string(),
            });
        }
        let hook = self.dispatch_hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(host.clone(), request.clone()).await;
        }
        Ok(())
    }

    async fn kill_task(&self, host: &Host, task_instance_id: i64) -> OrchestratorResult<()> {
        self.record(ExecutorCall::Kill {
            host: host.clone(),
            task_instance_id,
        });
        self.check_reachable(host)
    }

    async fn pause_task(&self, host: &Host, task_instance_id: i64) -> OrchestratorResult<()> {
        self.record(ExecutorCall::Pause {
            host: host.clone(),
            task_instance_id,
        });
        self.check_reachable(host)
    }

    async fn take_over_task(
        &self,
        host: &Host,
        request: &TakeOverRequest,
    ) -> OrchestratorResult<bool> {
        self.record(ExecutorCall::TakeOver {
            host: host.clone(),
            task_instance_id: request.task_instance_id,
        });
        self.check_reachable(host)?;
        Ok(*self.take_over_accepted.lock().unwrap())
    }
}

/// 记录被清理的外部应用ID
#[derive(Debug, Clone, Default)]
pub struct MockJobCleaner {
    killed: Arc<Mutex<Vec<String>>>,
}

impl MockJobCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn killed_applications(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalJobCleaner for MockJobCleaner {
    async fn kill_applications(&self, app_ids: &[String]) -> OrchestratorResult<()> {
        self.killed.lock().unwrap().extend(app_ids.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::TaskInstanceBuilder;

    fn request(id: i64) -> TaskDispatchRequest {
        TaskDispatchRequest {
            task_instance: TaskInstanceBuilder::new(id, "t").build(),
            master_host: Host::new("127.0.0.1", 5678),
            global_params: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_failing_and_rejecting_hosts() {
        let client = MockTaskExecutorClient::new();
        let good = Host::new("10.0.0.1", 1234);
        let down = Host::new("10.0.0.2", 1234);
        let full = Host::new("10.0.0.3", 1234);
        client.fail_host(&down);
        client.reject_host(&full);

        assert!(client.dispatch_task(&good, &request(1)).await.is_ok());
        assert!(client
            .dispatch_task(&down, &request(1))
            .await
            .unwrap_err()
            .is_host_failure());
        assert!(matches!(
            client.dispatch_task(&full, &request(1)).await,
            Err(OrchestratorError::DispatchRejected { .. })
        ));
        assert_eq!(client.dispatch_calls().len(), 3);
        assert_eq!(client.dispatch_count_to(&down), 1);
    }

    #[tokio::test]
    async fn test_dispatch_hook_runs_before_ack() {
        let client = MockTaskExecutorClient::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        client.on_dispatch(move |host, request| {
            let recorder = recorder.clone();
            async move {
                recorder
                    .lock()
                    .unwrap()
                    .push((host, request.task_instance.id));
            }
        });

        let host = Host::new("10.0.0.1", 1234);
        client.dispatch_task(&host, &request(7)).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(host, 7)]);

        // 被拒绝的请求不会触发回调
        client.reject_host(&Host::new("10.0.0.2", 1234));
        let _ = client
            .dispatch_task(&Host::new("10.0.0.2", 1234), &request(8))
            .await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
