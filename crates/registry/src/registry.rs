use async_trait::async_trait;
use orchestrator_errors::OrchestratorResult;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEventType {
    Add,
    Update,
    Remove,
}

/// 注册中心数据变更通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEvent {
    pub key: String,
    /// 删除事件中为被删除前的值
    pub data: Option<String>,
    pub event_type: RegistryEventType,
}

/// 注册中心存储后端抽象
///
/// key为 `/` 分隔的路径；`children` 只返回直接子节点名。
/// 订阅返回有界通道，消费过慢时写入方会被背压。
#[async_trait]
pub trait Registry: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> OrchestratorResult<()>;
    async fn get(&self, key: &str) -> OrchestratorResult<Option<String>>;
    async fn delete(&self, key: &str) -> OrchestratorResult<()>;
    async fn exists(&self, key: &str) -> OrchestratorResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
    async fn children(&self, key: &str) -> OrchestratorResult<Vec<String>>;
    async fn subscribe(&self, prefix: &str) -> OrchestratorResult<mpsc::Receiver<RegistryEvent>>;
    /// 非阻塞加锁，同一owner重复加锁视为成功
    async fn try_lock(&self, key: &str, owner: &str) -> OrchestratorResult<bool>;
    async fn unlock(&self, key: &str, owner: &str) -> OrchestratorResult<()>;
}
