use async_trait::async_trait;
use orchestrator_domain::{Host, WorkflowInstance, WorkflowInstanceRepository};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct InMemoryWorkflowInstanceRepository {
    instances: Arc<RwLock<HashMap<i64, WorkflowInstance>>>,
    next_id: Arc<RwLock<i64>>,
}

impl InMemoryWorkflowInstanceRepository {
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(1)),
        }
    }

    pub async fn count(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn all(&self) -> Vec<WorkflowInstance> {
        let mut instances: Vec<WorkflowInstance> =
            self.instances.read().await.values().cloned().collect();
        instances.sort_by_key(|i| i.id);
        instances
    }
}

impl Default for InMemoryWorkflowInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowInstanceRepository for InMemoryWorkflowInstanceRepository {
    async fn create(&self, instance: &WorkflowInstance) -> OrchestratorResult<WorkflowInstance> {
        let mut next_id = self.next_id.write().await;
        let mut created = instance.clone();
        created.id = *next_id;
        *next_id += 1;
        self.instances
            .write()
            .await
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, instance: &WorkflowInstance) -> OrchestratorResult<()> {
        let mut instances = self.instances.write().await;
        match instances.get_mut(&instance.id) {
            Some(existing) => {
                *existing = instance.clone();
                Ok(())
            }
            None => Err(OrchestratorError::workflow_instance_not_found(instance.id)),
        }
    }

    async fn find_by_id(&self, id: i64) -> OrchestratorResult<Option<WorkflowInstance>> {
        Ok(self.instances.read().await.get(&id).cloned())
    }

    async fn query_need_failover_workflow_instances(
        &self,
        host: &Host,
    ) -> OrchestratorResult<Vec<WorkflowInstance>> {
        let mut instances: Vec<WorkflowInstance> = self
            .instances
            .read()
            .await
            .values()
            .filter(|i| i.host.as_ref() == Some(host) && i.state.need_failover())
            .cloned()
            .collect();
        instances.sort_by_key(|i| i.id);
        Ok(instances)
    }
}
