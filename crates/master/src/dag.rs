//! 工作流运行期DAG
//!
//! 在静态DAG之上记录每个节点当前的任务运行体。图结构与运行体索引各自
//! 由读写锁保护，同一工作流内的写入只发生在该工作流的事件消费任务中。

use orchestrator_domain::{TaskDefinition, WorkflowDag, WorkflowDefinition};
use orchestrator_errors::OrchestratorResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::runnable::TaskExecutionRunnable;

#[derive(Default)]
struct RunnableIndex {
    by_name: HashMap<String, Arc<TaskExecutionRunnable>>,
    by_id: HashMap<i64, Arc<TaskExecutionRunnable>>,
}

/// 按任务名和任务实例ID索引的运行体仓库
#[derive(Default)]
pub struct TaskExecutionRunnableRepository {
    index: RwLock<RunnableIndex>,
}

impl TaskExecutionRunnableRepository {
    /// 同名节点的新尝试会替换名称索引，旧尝试仍可按ID查到
    pub async fn store(&self, runnable: Arc<TaskExecutionRunnable>) {
        let mut index = self.index.write().await;
        index
            .by_name
            .insert(runnable.name().to_string(), runnable.clone());
        index.by_id.insert(runnable.id(), runnable);
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Arc<TaskExecutionRunnable>> {
        self.index.read().await.by_name.get(name).cloned()
    }

    pub async fn get_by_id(&self, id: i64) -> Option<Arc<TaskExecutionRunnable>> {
        self.index.read().await.by_id.get(&id).cloned()
    }

    pub async fn remove_by_name(&self, name: &str) -> Option<Arc<TaskExecutionRunnable>> {
        self.index.write().await.by_name.remove(name)
    }

    /// 每个节点的当前运行体
    pub async fn current(&self) -> Vec<Arc<TaskExecutionRunnable>> {
        self.index.read().await.by_name.values().cloned().collect()
    }
}

pub struct WorkflowExecutionDag {
    definition: Arc<WorkflowDefinition>,
    graph: RwLock<WorkflowDag>,
    runnables: TaskExecutionRunnableRepository,
}

impl WorkflowExecutionDag {
    pub fn new(definition: Arc<WorkflowDefinition>) -> OrchestratorResult<Self> {
        let graph = WorkflowDag::from_definition(&definition)?;
        Ok(Self {
            definition,
            graph: RwLock::new(graph),
            runnables: TaskExecutionRunnableRepository::default(),
        })
    }

    pub fn definition(&self) -> &Arc<WorkflowDefinition> {
        &self.definition
    }

    pub fn task_definition(&self, name: &str) -> Option<&TaskDefinition> {
        self.definition.task_definition(name)
    }

    /// 节点是否可以触发：节点未被跳过且尚无运行体，并且每个直接上游
    /// 都已跳过或已成功。条件节点只要求上游已结束。
    /// 上游尚无运行体时一律视为未就绪。
    pub async fn is_task_able_to_be_triggered(&self, name: &str) -> bool {
        let graph = self.graph.read().await;
        let Some(node) = graph.node(name) else {
            return false;
        };
        if node.skip {
            return false;
        }
        if self.runnables.get_by_name(name).await.is_some() {
            return false;
        }

        let is_conditions = self
            .task_definition(name)
            .map(|t| t.is_conditions())
            .unwrap_or(false);

        for pre in &node.pre_nodes {
            if graph.is_skipped(pre) {
                continue;
            }
            let Some(pre_runnable) = self.runnables.get_by_name(pre).await else {
                debug!("节点 {} 的上游 {} 尚未触发", name, pre);
                return false;
            };
            let state = pre_runnable.state().await;
            let satisfied = if is_conditions {
                state.is_finished()
            } else {
                state.is_success()
            };
            if !satisfied {
                return false;
            }
        }
        true
    }

    pub async fn get_direct_pre_task_execution_runnable(
        &self,
        name: &str,
    ) -> Vec<Arc<TaskExecutionRunnable>> {
        let pre_nodes = self.get_direct_pre_nodes(name).await;
        let mut result = Vec::with_capacity(pre_nodes.len());
        for pre in pre_nodes {
            if let Some(runnable) = self.runnables.get_by_name(&pre).await {
                result.push(runnable);
            }
        }
        result
    }

    pub async fn get_direct_pre_nodes(&self, name: &str) -> Vec<String> {
        self.graph.read().await.pre_nodes(name).to_vec()
    }

    pub async fn get_direct_post_nodes(&self, name: &str) -> Vec<String> {
        self.graph.read().await.post_nodes(name).to_vec()
    }

    pub async fn start_nodes(&self) -> Vec<String> {
        self.graph.read().await.start_nodes()
    }

    pub async fn topological_order(&self) -> OrchestratorResult<Vec<String>> {
        self.graph.read().await.topological_order()
    }

    pub async fn is_skipped(&self, name: &str) -> bool {
        self.graph.read().await.is_skipped(name)
    }

    pub async fn skip_node_recursively(&self, name: &str) -> Vec<String> {
        let skipped = self.graph.write().await.skip_recursively(name);
        if !skipped.is_empty() {
            debug!("跳过节点: {:?}", skipped);
        }
        skipped
    }

    pub async fn store_task_execution_runnable(&self, runnable: Arc<TaskExecutionRunnable>) {
        self.runnables.store(runnable).await;
    }

    pub async fn get_task_execution_runnable_by_name(
        &self,
        name: &str,
    ) -> Option<Arc<TaskExecutionRunnable>> {
        self.runnables.get_by_name(name).await
    }

    pub async fn get_task_execution_runnable_by_id(
        &self,
        id: i64,
    ) -> Option<Arc<TaskExecutionRunnable>> {
        self.runnables.get_by_id(id).await
    }

    /// 移除节点的当前运行体，使其可以重新触发
    pub async fn remove_task_execution_runnable(&self, name: &str) {
        self.runnables.remove_by_name(name).await;
    }

    pub async fn task_execution_runnables(&self) -> Vec<Arc<TaskExecutionRunnable>> {
        self.runnables.current().await
    }

    /// 尚未结束的当前运行体
    pub async fn active_task_execution_runnables(&self) -> Vec<Arc<TaskExecutionRunnable>> {
        let mut active = Vec::new();
        for runnable in self.runnables.current().await {
            if !runnable.is_finished().await {
                active.push(runnable);
            }
        }
        active
    }

    /// 运行体是否为该节点的当前尝试
    pub async fn is_current_attempt(&self, runnable: &TaskExecutionRunnable) -> bool {
        self.runnables
            .get_by_name(runnable.name())
            .await
            .map(|current| current.id() == runnable.id())
            .unwrap_or(false)
    }

    pub async fn node_names(&self) -> Vec<String> {
        self.graph.read().await.node_names().to_vec()
    }
}
