//! 工作流的静态DAG
//!
//! 由工作流定义构建，节点以任务名标识。构建时校验边的端点与环路，
//! 运行期仅修改节点的skip标记。

use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::entities::WorkflowDefinition;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone)]
pub struct DagNode {
    pub name: String,
    pub task_code: i64,
    pub pre_nodes: Vec<String>,
    pub post_nodes: Vec<String>,
    pub skip: bool,
}

#[derive(Debug, Clone)]
pub struct WorkflowDag {
    nodes: HashMap<String, DagNode>,
    /// 定义中的节点顺序，保证遍历结果稳定
    order: Vec<String>,
}

impl WorkflowDag {
    pub fn from_definition(definition: &WorkflowDefinition) -> OrchestratorResult<Self> {
        let mut nodes = HashMap::with_capacity(definition.task_definitions.len());
        let mut order = Vec::with_capacity(definition.task_definitions.len());

        for task in &definition.task_definitions {
            if nodes.contains_key(&task.name) {
                return Err(OrchestratorError::InvalidDag(format!(
                    "重复的任务名: {}",
                    task.name
                )));
            }
            order.push(task.name.clone());
            nodes.insert(
                task.name.clone(),
                DagNode {
                    name: task.name.clone(),
                    task_code: task.code,
                    pre_nodes: Vec::new(),
                    post_nodes: Vec::new(),
                    skip: false,
                },
            );
        }

        for relation in &definition.relations {
            for endpoint in [&relation.pre_task, &relation.post_task] {
                if !nodes.contains_key(endpoint) {
                    return Err(OrchestratorError::InvalidDag(format!(
                        "依赖关系引用了不存在的任务: {endpoint}"
                    )));
                }
            }
            if relation.pre_task == relation.post_task {
                return Err(OrchestratorError::CircularDependency);
            }
            if let Some(pre) = nodes.get_mut(&relation.pre_task) {
                if !pre.post_nodes.contains(&relation.post_task) {
                    pre.post_nodes.push(relation.post_task.clone());
                }
            }
            if let Some(post) = nodes.get_mut(&relation.post_task) {
                if !post.pre_nodes.contains(&relation.pre_task) {
                    post.pre_nodes.push(relation.pre_task.clone());
                }
            }
        }

        let mut dag = Self { nodes, order };
        dag.topological_order()?;

        let disabled: Vec<String> = definition
            .task_definitions
            .iter()
            .filter(|t| !t.enabled)
            .map(|t| t.name.clone())
            .collect();
        for name in disabled {
            dag.skip_recursively(&name);
        }

        debug!(
            "构建工作流DAG完成: code={}, 节点数={}",
            definition.code,
            dag.nodes.len()
        );
        Ok(dag)
    }

    /// Kahn算法求拓扑序，存在环路时返回错误
    pub fn topological_order(&self) -> OrchestratorResult<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|name| (name.as_str(), self.nodes[name].pre_nodes.len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .filter(|name| in_degree[name.as_str()] == 0)
            .map(|name| name.as_str())
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(current) = queue.pop_front() {
            sorted.push(current.to_string());
            for post in &self.nodes[current].post_nodes {
                if let Some(degree) = in_degree.get_mut(post.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(post.as_str());
                    }
                }
            }
        }

        if sorted.len() != self.order.len() {
            return Err(OrchestratorError::CircularDependency);
        }
        Ok(sorted)
    }

    pub fn node(&self, name: &str) -> Option<&DagNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    pub fn pre_nodes(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.pre_nodes.as_slice())
            .unwrap_or(&[])
    }

    pub fn post_nodes(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.post_nodes.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.nodes.get(name).map(|n| n.skip).unwrap_or(false)
    }

    /// 没有上游且未被跳过的节点
    pub fn start_nodes(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                let node = &self.nodes[name.as_str()];
                node.pre_nodes.is_empty() && !node.skip
            })
            .cloned()
            .collect()
    }

    pub fn mark_skip(&mut self, name: &str) -> bool {
        match self.nodes.get_mut(name) {
            Some(node) if !node.skip => {
                node.skip = true;
                true
            }
            _ => false,
        }
    }

    /// 跳过节点，并级联跳过所有上游均被跳过的下游节点。
    /// 返回本次新跳过的节点名
    pub fn skip_recursively(&mut self, name: &str) -> Vec<String> {
        let mut skipped = Vec::new();
        let mut queue = VecDeque::from([name.to_string()]);

        while let Some(current) = queue.pop_front() {
            if !self.mark_skip(&current) {
                continue;
            }
            skipped.push(current.clone());
            for post in self.post_nodes(&current).to_vec() {
                let all_pre_skipped = self.pre_nodes(&post).iter().all(|p| self.is_skipped(p));
                if all_pre_skipped {
                    queue.push_back(post);
                }
            }
        }
        skipped
    }
}
