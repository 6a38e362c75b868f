use async_trait::async_trait;
use orchestrator_domain::{Command, CommandRepository};
use orchestrator_errors::OrchestratorResult;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct InMemoryCommandRepository {
    commands: Arc<Mutex<Vec<Command>>>,
    next_id: Arc<Mutex<i64>>,
}

impl InMemoryCommandRepository {
    pub fn new() -> Self {
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub async fn pending(&self) -> Vec<Command> {
        self.commands.lock().await.clone()
    }
}

impl Default for InMemoryCommandRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRepository for InMemoryCommandRepository {
    async fn insert(&self, command: &Command) -> OrchestratorResult<Command> {
        let mut next_id = self.next_id.lock().await;
        let mut inserted = command.clone();
        inserted.id = *next_id;
        *next_id += 1;
        self.commands.lock().await.push(inserted.clone());
        Ok(inserted)
    }

    async fn claim_commands(&self, limit: usize) -> OrchestratorResult<Vec<Command>> {
        let mut commands = self.commands.lock().await;
        commands.sort_by_key(|c| (c.priority, c.id));
        let take = limit.min(commands.len());
        Ok(commands.drain(..take).collect())
    }

    async fn count(&self) -> OrchestratorResult<usize> {
        Ok(self.commands.lock().await.len())
    }
}
