use orchestrator_domain::Host;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use super::host_weight::HostWeight;

/// 从同一分组的候选Worker中挑选一台
pub trait SelectionStrategy: Send + Sync {
    fn select(&self, candidates: &[HostWeight]) -> Option<Host>;

    fn name(&self) -> &str;
}

/// 均匀随机
#[derive(Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for RandomStrategy {
    fn select(&self, candidates: &[HostWeight]) -> Option<Host> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..candidates.len());
        let selected = &candidates[index];
        debug!(
            "随机策略选择Worker: {} (索引: {}/{})",
            selected.host,
            index,
            candidates.len()
        );
        Some(selected.host.clone())
    }

    fn name(&self) -> &str {
        "Random"
    }
}

/// 低负载优先的平滑轮询
///
/// 每次选择时各候选的游标累加自身分数，取游标最小者，并给被选中者
/// 再加上本轮分数总和，避免同一台Worker被连续选中。
#[derive(Default)]
pub struct LowerWeightRoundRobin {
    cursors: Mutex<HashMap<Host, f64>>,
}

impl LowerWeightRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn cursor(&self, host: &Host) -> Option<f64> {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .copied()
    }
}

impl SelectionStrategy for LowerWeightRoundRobin {
    fn select(&self, candidates: &[HostWeight]) -> Option<Host> {
        if candidates.is_empty() {
            return None;
        }

        let mut cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
        cursors.retain(|host, _| candidates.iter().any(|c| &c.host == host));

        let mut total = 0.0;
        // (候选下标, 新游标, 旧游标)
        let mut best: Option<(usize, f64, f64)> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let score = candidate.score();
            total += score;

            let previous = cursors.get(&candidate.host).copied().unwrap_or(0.0);
            let current = previous + score;
            cursors.insert(candidate.host.clone(), current);

            let better = match best {
                None => true,
                Some((best_index, best_current, best_previous)) => current
                    .total_cmp(&best_current)
                    .then_with(|| previous.total_cmp(&best_previous))
                    .then_with(|| {
                        candidate
                            .startup_time
                            .cmp(&candidates[best_index].startup_time)
                    })
                    .is_lt(),
            };
            if better {
                best = Some((index, current, previous));
            }
        }

        let (index, _, _) = best?;
        let selected = &candidates[index].host;
        if let Some(cursor) = cursors.get_mut(selected) {
            *cursor += total;
        }
        debug!("低负载策略选择Worker: {} (本轮总分: {:.2})", selected, total);
        Some(selected.clone())
    }

    fn name(&self) -> &str {
        "LowerWeight"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::HashSet;

    fn candidate(ip: &str, usage: f64) -> HostWeight {
        HostWeight {
            host: Host::new(ip, 1234),
            weight: 100,
            cpu_usage: usage,
            memory_usage: usage,
            load_average: usage,
            waiting_task_count: 0,
            startup_time: Utc::now(),
        }
    }

    #[test]
    fn test_random_covers_all_hosts() {
        let strategy = RandomStrategy::new();
        let candidates = vec![
            candidate("10.0.0.1", 0.1),
            candidate("10.0.0.2", 0.1),
            candidate("10.0.0.3", 0.1),
        ];
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            seen.insert(strategy.select(&candidates).unwrap());
        }
        assert_eq!(seen.len(), 3);
        assert!(strategy.select(&[]).is_none());
    }

    #[test]
    fn test_lower_weight_prefers_idle_host() {
        let strategy = LowerWeightRoundRobin::new();
        let idle = candidate("10.0.0.1", 0.1);
        let busy = candidate("10.0.0.2", 0.9);
        let candidates = vec![busy.clone(), idle.clone()];

        let mut idle_count = 0;
        for _ in 0..10 {
            if strategy.select(&candidates).unwrap() == idle.host {
                idle_count += 1;
            }
        }
        assert!(idle_count > 5, "空闲节点只被选中 {idle_count} 次");
        // 繁忙节点也会轮到
        assert!(idle_count < 10);
    }

    #[test]
    fn test_lower_weight_penalises_selected_host() {
        let strategy = LowerWeightRoundRobin::new();
        let a = candidate("10.0.0.1", 0.5);
        let b = candidate("10.0.0.2", 0.5);
        let candidates = vec![a.clone(), b.clone()];

        let first = strategy.select(&candidates).unwrap();
        let second = strategy.select(&candidates).unwrap();
        assert_ne!(first, second);
        // 两台各被选一次后游标相等
        assert_eq!(strategy.cursor(&a.host), strategy.cursor(&b.host));
    }

    #[test]
    fn test_lower_weight_tie_breaks_by_startup_time() {
        let strategy = LowerWeightRoundRobin::new();
        let mut late = candidate("10.0.0.1", 0.5);
        late.startup_time = Utc::now();
        let mut early = candidate("10.0.0.2", 0.5);
        early.startup_time = late.startup_time - Duration::minutes(5);

        assert_eq!(strategy.select(&[late, early.clone()]).unwrap(), early.host);
    }

    #[test]
    fn test_lower_weight_forgets_removed_hosts() {
        let strategy = LowerWeightRoundRobin::new();
        let a = candidate("10.0.0.1", 0.5);
        let b = candidate("10.0.0.2", 0.5);
        strategy.select(&[a.clone(), b.clone()]);
        strategy.select(&[a.clone()]);
        assert!(strategy.cursor(&b.host).is_none());
    }
}
