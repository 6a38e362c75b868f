//! Master引擎指标
//!
//! 通过 `metrics` 门面记录，导出方式由进程入口决定

use metrics::{counter, gauge, histogram};

pub struct MasterMetrics;

impl MasterMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_workflow_submit(&self) {
        counter!("orchestrator_workflow_instance_total", "event" => "submit").increment(1);
    }

    pub fn record_workflow_finish(&self, result: &'static str, duration_seconds: f64) {
        counter!("orchestrator_workflow_instance_total", "event" => "finish").increment(1);
        counter!("orchestrator_workflow_instance_total", "event" => result).increment(1);
        histogram!("orchestrator_workflow_instance_duration_seconds").record(duration_seconds);
    }

    pub fn record_workflow_failover(&self) {
        counter!("orchestrator_workflow_instance_total", "event" => "failover").increment(1);
    }

    pub fn set_running_workflows(&self, count: usize) {
        gauge!("orchestrator_running_workflow_instances").set(count as f64);
    }

    pub fn record_task_submit(&self) {
        counter!("orchestrator_task_instance_total", "event" => "submit").increment(1);
    }

    pub fn record_task_finish(&self, result: &'static str) {
        counter!("orchestrator_task_instance_total", "event" => "finish").increment(1);
        counter!("orchestrator_task_instance_total", "event" => result).increment(1);
    }

    pub fn record_task_retry(&self) {
        counter!("orchestrator_task_instance_total", "event" => "retry").increment(1);
    }

    pub fn record_task_timeout(&self) {
        counter!("orchestrator_task_instance_total", "event" => "timeout").increment(1);
    }

    pub fn record_task_failover(&self) {
        counter!("orchestrator_task_instance_total", "event" => "failover").increment(1);
    }

    pub fn record_dispatch_success(&self, duration_seconds: f64) {
        counter!("orchestrator_task_dispatch_total", "result" => "success").increment(1);
        histogram!("orchestrator_task_dispatch_duration_seconds").record(duration_seconds);
    }

    pub fn record_dispatch_failure(&self) {
        counter!("orchestrator_task_dispatch_total", "result" => "failure").increment(1);
    }

    pub fn record_dispatch_exhausted(&self) {
        counter!("orchestrator_task_dispatch_total", "result" => "exhausted").increment(1);
    }

    /// 任务首次分发失败时加一，最终分发成功或放弃时减一
    pub fn increase_dispatch_failed_tasks(&self) {
        gauge!("orchestrator_task_dispatch_failed_tasks").increment(1.0);
    }

    pub fn decrease_dispatch_failed_tasks(&self) {
        gauge!("orchestrator_task_dispatch_failed_tasks").decrement(1.0);
    }

    pub fn set_dispatch_queue_size(&self, size: usize) {
        gauge!("orchestrator_task_dispatch_queue_size").set(size as f64);
    }
}

impl Default for MasterMetrics {
    fn default() -> Self {
        Self::new()
    }
}
