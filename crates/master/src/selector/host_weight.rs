use chrono::{DateTime, Utc};
use orchestrator_domain::{Host, WorkerHeartBeat};

const CPU_FACTOR: f64 = 10.0;
const MEMORY_FACTOR: f64 = 20.0;
const LOAD_FACTOR: f64 = 70.0;

/// 由Worker心跳计算出的选择快照，不落库
#[derive(Debug, Clone, PartialEq)]
pub struct HostWeight {
    pub host: Host,
    pub weight: u32,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub load_average: f64,
    pub waiting_task_count: u32,
    pub startup_time: DateTime<Utc>,
}

impl HostWeight {
    /// 负载分数，越小越空闲
    ///
    /// 资源占用按权重缩放后加上等待中的任务数
    pub fn score(&self) -> f64 {
        let usage = self.cpu_usage * CPU_FACTOR
            + self.memory_usage * MEMORY_FACTOR
            + self.load_average * LOAD_FACTOR;
        usage * 100.0 / f64::from(self.weight.max(1)) + f64::from(self.waiting_task_count)
    }
}

impl From<&WorkerHeartBeat> for HostWeight {
    fn from(heartbeat: &WorkerHeartBeat) -> Self {
        Self {
            host: heartbeat.address(),
            weight: heartbeat.worker_weight,
            cpu_usage: heartbeat.cpu_usage,
            memory_usage: heartbeat.memory_usage,
            load_average: heartbeat.load_average,
            waiting_task_count: heartbeat.waiting_task_count,
            startup_time: heartbeat.startup_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(weight: u32, usage: f64, waiting: u32) -> HostWeight {
        HostWeight {
            host: Host::new("10.0.0.1", 1234),
            weight,
            cpu_usage: usage,
            memory_usage: usage,
            load_average: usage,
            waiting_task_count: waiting,
            startup_time: Utc::now(),
        }
    }

    #[test]
    fn test_score() {
        // (0.5*10 + 0.5*20 + 0.5*70) * 100 / 100 = 50
        assert!((weight(100, 0.5, 0).score() - 50.0).abs() < 1e-9);
        // 权重翻倍分数减半
        assert!((weight(200, 0.5, 0).score() - 25.0).abs() < 1e-9);
        assert!((weight(100, 0.5, 3).score() - 53.0).abs() < 1e-9);
        // 权重为0按1处理
        assert!(weight(0, 0.1, 0).score().is_finite());
    }
}
