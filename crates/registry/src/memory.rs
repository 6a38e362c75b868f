use async_trait::async_trait;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

use crate::registry::{Registry, RegistryEvent, RegistryEventType};

struct Subscriber {
    prefix: String,
    sender: mpsc::Sender<RegistryEvent>,
}

/// 内存注册中心实现
///
/// 适用于单机嵌入式部署和测试，数据随进程退出而丢失。
pub struct InMemoryRegistry {
    data: Arc<RwLock<BTreeMap<String, String>>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    locks: Arc<Mutex<HashMap<String, String>>>,
    subscription_capacity: usize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(subscription_capacity: usize) -> Self {
        info!(
            "创建内存注册中心, 订阅通道容量: {}",
            subscription_capacity
        );
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            subscription_capacity: subscription_capacity.max(1),
        }
    }

    async fn notify(&self, event: RegistryEvent) {
        let senders: Vec<mpsc::Sender<RegistryEvent>> = {
            let mut subscribers = self.subscribers.lock().await;
            subscribers.retain(|s| !s.sender.is_closed());
            subscribers
                .iter()
                .filter(|s| event.key.starts_with(&s.prefix))
                .map(|s| s.sender.clone())
                .collect()
        };

        for sender in senders {
            if sender.send(event.clone()).await.is_err() {
                debug!("订阅者已关闭, 忽略事件: {}", event.key);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_key(key: &str) -> OrchestratorResult<()> {
    if !key.starts_with('/') || key.ends_with('/') {
        return Err(OrchestratorError::registry(format!("非法的注册中心路径: {key}")));
    }
    Ok(())
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn put(&self, key: &str, value: &str) -> OrchestratorResult<()> {
        validate_key(key)?;
        let previous = self
            .data
            .write()
            .await
            .insert(key.to_string(), value.to_string());

        let event_type = if previous.is_some() {
            RegistryEventType::Update
        } else {
            RegistryEventType::Add
        };
        self.notify(RegistryEvent {
            key: key.to_string(),
            data: Some(value.to_string()),
            event_type,
        })
        .await;
        Ok(())
    }

    async fn get(&self, key: &str) -> OrchestratorResult<Option<String>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> OrchestratorResult<()> {
        let removed = self.data.write().await.remove(key);
        if let Some(value) = removed {
            self.notify(RegistryEvent {
                key: key.to_string(),
                data: Some(value),
                event_type: RegistryEventType::Remove,
            })
            .await;
        }
        Ok(())
    }

    async fn children(&self, key: &str) -> OrchestratorResult<Vec<String>> {
        let prefix = format!("{}/", key.trim_end_matches('/'));
        let data = self.data.read().await;
        let mut children: Vec<String> = data
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let child = &k[prefix.len()..];
                child.split('/').next().map(str::to_string)
            })
            .collect();
        children.dedup();
        Ok(children)
    }

    async fn subscribe(&self, prefix: &str) -> OrchestratorResult<mpsc::Receiver<RegistryEvent>> {
        let (sender, receiver) = mpsc::channel(self.subscription_capacity);
        self.subscribers.lock().await.push(Subscriber {
            prefix: prefix.to_string(),
            sender,
        });
        debug!("新增注册中心订阅: {}", prefix);
        Ok(receiver)
    }

    async fn try_lock(&self, key: &str, owner: &str) -> OrchestratorResult<bool> {
        validate_key(key)?;
        let mut locks = self.locks.lock().await;
        match locks.get(key) {
            Some(holder) => Ok(holder == owner),
            None => {
                locks.insert(key.to_string(), owner.to_string());
                Ok(true)
            }
        }
    }

    async fn unlock(&self, key: &str, owner: &str) -> OrchestratorResult<()> {
        let mut locks = self.locks.lock().await;
        match locks.get(key) {
            Some(holder) if holder == owner => {
                locks.remove(key);
                Ok(())
            }
            Some(holder) => Err(OrchestratorError::registry(format!(
                "锁 {key} 由 {holder} 持有, {owner} 无法释放"
            ))),
            None => Ok(()),
        }
    }
}
