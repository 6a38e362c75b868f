//! Worker选择
//!
//! 公共流程负责按分组取快照、过滤已排除的Worker，具体挑选交给注入的策略。

mod cache;
mod host_weight;
mod strategy;

pub use cache::{GroupSnapshot, WorkerGroupHostCache};
pub use host_weight::HostWeight;
pub use strategy::{LowerWeightRoundRobin, RandomStrategy, SelectionStrategy};

use orchestrator_config::HostSelectorType;
use orchestrator_domain::Host;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct HostSelector {
    cache: Arc<WorkerGroupHostCache>,
    strategy: Arc<dyn SelectionStrategy>,
}

impl HostSelector {
    pub fn new(cache: Arc<WorkerGroupHostCache>, strategy: Arc<dyn SelectionStrategy>) -> Self {
        Self { cache, strategy }
    }

    pub fn from_type(cache: Arc<WorkerGroupHostCache>, selector_type: HostSelectorType) -> Self {
        let strategy: Arc<dyn SelectionStrategy> = match selector_type {
            HostSelectorType::Random => Arc::new(RandomStrategy::new()),
            HostSelectorType::LowerWeight => Arc::new(LowerWeightRoundRobin::new()),
        };
        Self::new(cache, strategy)
    }

    pub fn cache(&self) -> &Arc<WorkerGroupHostCache> {
        &self.cache
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// 在分组内挑选一台未被排除的Worker
    ///
    /// 分组内没有注册Worker时返回 `WorkerGroupNotFound`，全部繁忙或异常时返回
    /// `NoAvailableWorker`；可用Worker都已被排除时返回 `Ok(None)`。
    pub async fn select(
        &self,
        worker_group: &str,
        excluded: &HashSet<Host>,
    ) -> OrchestratorResult<Option<Host>> {
        let group = match self.cache.group(worker_group).await {
            Some(group) if group.registered > 0 => group,
            _ => return Err(OrchestratorError::worker_group_not_found(worker_group)),
        };
        if group.available.is_empty() {
            return Err(OrchestratorError::NoAvailableWorker {
                group: worker_group.to_string(),
            });
        }

        let candidates: Vec<HostWeight> = group
            .available
            .into_iter()
            .filter(|c| !excluded.contains(&c.host))
            .collect();
        if candidates.is_empty() {
            debug!("分组 {} 的可用Worker已全部排除", worker_group);
            return Ok(None);
        }
        Ok(self.strategy.select(&candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchestrator_config::RegistryConfig;
    use orchestrator_domain::{ServerStatus, WorkerHeartBeat};
    use orchestrator_registry::{InMemoryRegistry, Registry, RegistryClient};

    fn heartbeat(ip: &str, status: ServerStatus) -> WorkerHeartBeat {
        let now = Utc::now();
        WorkerHeartBeat {
            host: ip.to_string(),
            port: 1234,
            process_id: 1,
            startup_time: now,
            report_time: now,
            cpu_usage: 0.1,
            memory_usage: 0.1,
            load_average: 0.1,
            server_status: status,
            worker_group: "default".to_string(),
            worker_weight: 100,
            waiting_task_count: 0,
        }
    }

    async fn selector(workers: &[(&str, ServerStatus)], selector_type: HostSelectorType) -> HostSelector {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let client = RegistryClient::new(registry, RegistryConfig::default());
        for (ip, status) in workers {
            client.register_worker(&heartbeat(ip, *status)).await.unwrap();
        }
        let cache = Arc::new(WorkerGroupHostCache::new(client));
        cache.refresh().await.unwrap();
        HostSelector::from_type(cache, selector_type)
    }

    #[tokio::test]
    async fn test_busy_host_never_selected() {
        for selector_type in [HostSelectorType::Random, HostSelectorType::LowerWeight] {
            let selector = selector(
                &[
                    ("10.0.0.1", ServerStatus::Normal),
                    ("10.0.0.2", ServerStatus::Busy),
                    ("10.0.0.3", ServerStatus::Abnormal),
                ],
                selector_type,
            )
            .await;
            for _ in 0..200 {
                let host = selector
                    .select("default", &HashSet::new())
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(host.ip, "10.0.0.1");
            }
        }
    }

    #[tokio::test]
    async fn test_empty_group_errors() {
        let selector = selector(&[("10.0.0.1", ServerStatus::Busy)], HostSelectorType::Random).await;

        let err = selector.select("etl", &HashSet::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkerGroupNotFound { .. }));
        assert!(err.is_retryable());

        let err = selector.select("default", &HashSet::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NoAvailableWorker { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_excluded_hosts_are_skipped() {
        let selector = selector(
            &[
                ("10.0.0.1", ServerStatus::Normal),
                ("10.0.0.2", ServerStatus::Normal),
            ],
            HostSelectorType::LowerWeight,
        )
        .await;

        let mut excluded = HashSet::new();
        excluded.insert(Host::new("10.0.0.1", 1234));
        let host = selector.select("default", &excluded).await.unwrap().unwrap();
        assert_eq!(host.ip, "10.0.0.2");

        excluded.insert(host);
        assert!(selector.select("default", &excluded).await.unwrap().is_none());
    }
}
