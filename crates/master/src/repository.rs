use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::runnable::WorkflowExecutionRunnable;

/// 当前Master上运行中的工作流，每个实例ID至多一个
#[derive(Default)]
pub struct WorkflowExecutionRunnableRepository {
    runnables: RwLock<HashMap<i64, Arc<WorkflowExecutionRunnable>>>,
}

impl WorkflowExecutionRunnableRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, runnable: Arc<WorkflowExecutionRunnable>) -> OrchestratorResult<()> {
        let mut runnables = self.runnables.write().await;
        if runnables.contains_key(&runnable.id()) {
            return Err(OrchestratorError::WorkflowAlreadyRunning { id: runnable.id() });
        }
        runnables.insert(runnable.id(), runnable);
        Ok(())
    }

    pub async fn get(&self, workflow_instance_id: i64) -> Option<Arc<WorkflowExecutionRunnable>> {
        self.runnables.read().await.get(&workflow_instance_id).cloned()
    }

    pub async fn contains(&self, workflow_instance_id: i64) -> bool {
        self.runnables.read().await.contains_key(&workflow_instance_id)
    }

    pub async fn remove(&self, workflow_instance_id: i64) -> Option<Arc<WorkflowExecutionRunnable>> {
        self.runnables.write().await.remove(&workflow_instance_id)
    }

    pub async fn all(&self) -> Vec<Arc<WorkflowExecutionRunnable>> {
        self.runnables.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.runnables.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runnables.read().await.is_empty()
    }
}
