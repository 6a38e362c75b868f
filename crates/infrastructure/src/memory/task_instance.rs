use async_trait::async_trait;
use orchestrator_domain::{Host, TaskInstance, TaskInstanceRepository};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct InMemoryTaskInstanceRepository {
    instances: Arc<RwLock<HashMap<i64, TaskInstance>>>,
    next_id: Arc<RwLock<i64>>,
}

impl InMemoryTaskInstanceRepository {
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(1)),
        }
    }

    /// 工作流实例下的全部尝试，包括已失效的
    pub async fn find_by_workflow_instance_id(&self, workflow_instance_id: i64) -> Vec<TaskInstance> {
        let mut instances: Vec<TaskInstance> = self
            .instances
            .read()
            .await
            .values()
            .filter(|t| t.workflow_instance_id == workflow_instance_id)
            .cloned()
            .collect();
        instances.sort_by_key(|t| t.id);
        instances
    }

    pub async fn count(&self) -> usize {
        self.instances.read().await.len()
    }
}

impl Default for InMemoryTaskInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskInstanceRepository for InMemoryTaskInstanceRepository {
    async fn create(&self, instance: &TaskInstance) -> OrchestratorResult<TaskInstance> {
        let mut next_id = self.next_id.write().await;
        let mut created = instance.clone();
        created.id = *next_id;
        *next_id += 1;

        let mut instances = self.instances.write().await;
        // 同一节点的旧尝试失效
        if created.valid {
            for existing in instances.values_mut() {
                if existing.workflow_instance_id == created.workflow_instance_id
                    && existing.name == created.name
                {
                    existing.valid = false;
                }
            }
        }
        instances.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, instance: &TaskInstance) -> OrchestratorResult<()> {
        let mut instances = self.instances.write().await;
        match instances.get_mut(&instance.id) {
            Some(existing) => {
                *existing = instance.clone();
                Ok(())
            }
            None => Err(OrchestratorError::task_instance_not_found(instance.id)),
        }
    }

    async fn find_by_id(&self, id: i64) -> OrchestratorResult<Option<TaskInstance>> {
        Ok(self.instances.read().await.get(&id).cloned())
    }

    async fn query_valid_task_list_by_workflow_instance_id(
        &self,
        workflow_instance_id: i64,
    ) -> OrchestratorResult<Vec<TaskInstance>> {
        let mut instances: Vec<TaskInstance> = self
            .instances
            .read()
            .await
            .values()
            .filter(|t| t.workflow_instance_id == workflow_instance_id && t.valid)
            .cloned()
            .collect();
        instances.sort_by_key(|t| t.id);
        Ok(instances)
    }

    async fn query_need_failover_task_instances(
        &self,
        host: &Host,
    ) -> OrchestratorResult<Vec<TaskInstance>> {
        let mut instances: Vec<TaskInstance> = self
            .instances
            .read()
            .await
            .values()
            .filter(|t| t.valid && t.host.as_ref() == Some(host) && t.state.need_failover())
            .cloned()
            .collect();
        instances.sort_by_key(|t| t.id);
        Ok(instances)
    }
}
