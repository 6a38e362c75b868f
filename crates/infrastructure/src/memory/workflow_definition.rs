use async_trait::async_trait;
use orchestrator_domain::{WorkflowDefinition, WorkflowDefinitionRepository};
use orchestrator_errors::OrchestratorResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowDefinitionRepository {
    definitions: Arc<RwLock<HashMap<(i64, i32), WorkflowDefinition>>>,
}

impl InMemoryWorkflowDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for InMemoryWorkflowDefinitionRepository {
    async fn save(&self, definition: &WorkflowDefinition) -> OrchestratorResult<()> {
        self.definitions
            .write()
            .await
            .insert((definition.code, definition.version), definition.clone());
        Ok(())
    }

    async fn find_by_code_and_version(
        &self,
        code: i64,
        version: i32,
    ) -> OrchestratorResult<Option<WorkflowDefinition>> {
        Ok(self.definitions.read().await.get(&(code, version)).cloned())
    }

    async fn find_latest(&self, code: i64) -> OrchestratorResult<Option<WorkflowDefinition>> {
        Ok(self
            .definitions
            .read()
            .await
            .values()
            .filter(|d| d.code == code)
            .max_by_key(|d| d.version)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(version: i32) -> WorkflowDefinition {
        WorkflowDefinition {
            code: 10,
            version,
            name: "wf".to_string(),
            task_definitions: vec![],
            relations: vec![],
            global_params: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_find_latest_version() {
        let repo = InMemoryWorkflowDefinitionRepository::new();
        repo.save(&definition(1)).await.unwrap();
        repo.save(&definition(3)).await.unwrap();
        repo.save(&definition(2)).await.unwrap();

        assert_eq!(repo.find_latest(10).await.unwrap().unwrap().version, 3);
        assert!(repo.find_latest(11).await.unwrap().is_none());
        assert!(repo
            .find_by_code_and_version(10, 2)
            .await
            .unwrap()
            .is_some());
    }
}
