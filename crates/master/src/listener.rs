//! 工作流生命周期监听器
//!
//! 事件被状态机成功处理后依次通知匹配的监听器。监听器的错误和panic
//! 只记录日志，不影响事件处理。

use async_trait::async_trait;
use futures::FutureExt;
use orchestrator_errors::OrchestratorResult;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::events::{WorkflowLifecycleEvent, WorkflowLifecycleEventType};
use crate::runnable::WorkflowExecutionRunnable;

#[async_trait]
pub trait WorkflowLifecycleListener: Send + Sync {
    fn name(&self) -> &str;

    fn matches(&self, event: &WorkflowLifecycleEvent) -> bool;

    async fn notify(
        &self,
        wf: &WorkflowExecutionRunnable,
        event: &WorkflowLifecycleEvent,
    ) -> OrchestratorResult<()>;
}

/// 工作流收尾时输出一条汇总日志
pub struct WorkflowFinishLogListener;

#[async_trait]
impl WorkflowLifecycleListener for WorkflowFinishLogListener {
    fn name(&self) -> &str {
        "workflow-finish-log"
    }

    fn matches(&self, event: &WorkflowLifecycleEvent) -> bool {
        event.event_type() == WorkflowLifecycleEventType::Finalize
    }

    async fn notify(
        &self,
        wf: &WorkflowExecutionRunnable,
        _event: &WorkflowLifecycleEvent,
    ) -> OrchestratorResult<()> {
        let instance = wf.instance().await;
        let tasks = wf.dag().task_execution_runnables().await;
        info!(
            "{} 已收尾，共 {} 个任务节点，耗时 {:.3}s",
            instance.entity_description(),
            tasks.len(),
            wf.elapsed_seconds()
        );
        Ok(())
    }
}

/// 通知所有匹配的监听器
pub async fn notify_listeners(
    listeners: &[Arc<dyn WorkflowLifecycleListener>],
    wf: &WorkflowExecutionRunnable,
    event: &WorkflowLifecycleEvent,
) {
    for listener in listeners.iter().filter(|l| l.matches(event)) {
        match AssertUnwindSafe(listener.notify(wf, event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "监听器 {} 处理工作流实例 {} 的 {} 事件失败: {}",
                listener.name(),
                wf.id(),
                event.event_type(),
                e
            ),
            Err(_) => error!(
                "监听器 {} 处理工作流实例 {} 的 {} 事件时panic",
                listener.name(),
                wf.id(),
                event.event_type()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::{CommandType, TaskDefinition, WorkflowDefinition, WorkflowInstance};
    use orchestrator_errors::OrchestratorError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowLifecycleListener for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn matches(&self, _event: &WorkflowLifecycleEvent) -> bool {
            true
        }

        async fn notify(
            &self,
            _wf: &WorkflowExecutionRunnable,
            _event: &WorkflowLifecycleEvent,
        ) -> OrchestratorResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl WorkflowLifecycleListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn matches(&self, _event: &WorkflowLifecycleEvent) -> bool {
            true
        }

        async fn notify(
            &self,
            _wf: &WorkflowExecutionRunnable,
            event: &WorkflowLifecycleEvent,
        ) -> OrchestratorResult<()> {
            if *event == WorkflowLifecycleEvent::Start {
                panic!("boom");
            }
            Err(OrchestratorError::Internal("listener".to_string()))
        }
    }

    fn workflow() -> WorkflowExecutionRunnable {
        let definition = WorkflowDefinition {
            code: 1,
            version: 1,
            name: "wf".to_string(),
            task_definitions: vec![TaskDefinition::new(1, "a", "SHELL")],
            relations: vec![],
            global_params: HashMap::new(),
        };
        let instance = WorkflowInstance::new(&definition, CommandType::StartWorkflow);
        WorkflowExecutionRunnable::new(instance, Arc::new(definition)).unwrap()
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_others() {
        let counting = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let listeners: Vec<Arc<dyn WorkflowLifecycleListener>> =
            vec![Arc::new(Failing), counting.clone()];
        let wf = workflow();

        notify_listeners(&listeners, &wf, &WorkflowLifecycleEvent::Start).await;
        notify_listeners(&listeners, &wf, &WorkflowLifecycleEvent::Succeed).await;

        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_finish_log_listener_only_matches_finalize() {
        let listener = WorkflowFinishLogListener;
        assert!(listener.matches(&WorkflowLifecycleEvent::Finalize));
        assert!(!listener.matches(&WorkflowLifecycleEvent::Succeed));
    }
}
