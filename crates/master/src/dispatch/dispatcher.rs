use orchestrator_config::DispatchConfig;
use orchestrator_domain::{Host, TaskDispatchRequest, TaskExecutorClient};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::metrics::MasterMetrics;
use crate::selector::HostSelector;

/// 把任务发送到分组内的某台Worker
///
/// 同一台Worker最多尝试 `max_send_attempts` 次，失败或被拒绝后排除该Worker
/// 并重新选择，直到候选耗尽。
pub struct TaskDispatcher {
    selector: Arc<HostSelector>,
    client: Arc<dyn TaskExecutorClient>,
    config: DispatchConfig,
    metrics: Arc<MasterMetrics>,
}

impl TaskDispatcher {
    pub fn new(
        selector: Arc<HostSelector>,
        client: Arc<dyn TaskExecutorClient>,
        config: DispatchConfig,
        metrics: Arc<MasterMetrics>,
    ) -> Self {
        Self {
            selector,
            client,
            config,
            metrics,
        }
    }

    pub async fn dispatch(&self, request: &TaskDispatchRequest) -> OrchestratorResult<Host> {
        let task = &request.task_instance;
        let mut excluded = HashSet::new();

        loop {
            let host = match self.selector.select(&task.worker_group, &excluded).await? {
                Some(host) => host,
                None => {
                    warn!(
                        "任务实例 {} 在分组 {} 中已无可尝试的Worker",
                        task.id, task.worker_group
                    );
                    self.metrics.record_dispatch_exhausted();
                    return Err(OrchestratorError::DispatchCandidatesExhausted {
                        task_instance_id: task.id,
                    });
                }
            };

            let started = Instant::now();
            match self.send_with_retry(&host, request).await {
                Ok(()) => {
                    self.metrics
                        .record_dispatch_success(started.elapsed().as_secs_f64());
                    info!("任务实例 {} ({}) 已分发到 {}", task.id, task.name, host);
                    return Ok(host);
                }
                Err(e) => {
                    warn!("任务实例 {} 分发到 {} 失败，排除该Worker: {}", task.id, host, e);
                    self.metrics.record_dispatch_failure();
                    excluded.insert(host);
                }
            }
        }
    }

    async fn send_with_retry(
        &self,
        host: &Host,
        request: &TaskDispatchRequest,
    ) -> OrchestratorResult<()> {
        let attempts = self.config.max_send_attempts.max(1);
        let send_timeout = Duration::from_millis(self.config.send_timeout_ms);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = tokio::time::timeout(send_timeout, self.client.dispatch_task(host, request))
                .await
                .unwrap_or_else(|_| {
                    Err(OrchestratorError::Timeout(format!(
                        "发送任务到 {} 超过 {}ms",
                        host, self.config.send_timeout_ms
                    )))
                });

            match result {
                Ok(()) => return Ok(()),
                Err(e @ OrchestratorError::DispatchRejected { .. }) => return Err(e),
                Err(e) => {
                    debug!("发送任务到 {} 失败, 第 {}/{} 次: {}", host, attempt, attempts, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.send_retry_interval_ms))
                            .await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OrchestratorError::network(format!("发送任务到 {} 失败", host))
        }))
    }
}
