use orchestrator_domain::Host;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MASTER_NODE_PATH: &str = "/nodes/master";
pub const WORKER_NODE_PATH: &str = "/nodes/worker";
pub const MASTER_FAILOVER_LOCK: &str = "/lock/failover/master";
pub const WORKER_FAILOVER_LOCK: &str = "/lock/failover/worker";
/// Master启动自检时持有的全局锁
pub const MASTERS_LOCK: &str = "/lock/masters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Master,
    Worker,
}

impl NodeType {
    pub fn node_path(&self) -> &'static str {
        match self {
            NodeType::Master => MASTER_NODE_PATH,
            NodeType::Worker => WORKER_NODE_PATH,
        }
    }

    pub fn failover_lock_path(&self) -> &'static str {
        match self {
            NodeType::Master => MASTER_FAILOVER_LOCK,
            NodeType::Worker => WORKER_FAILOVER_LOCK,
        }
    }

    pub fn node_key(&self, host: &Host) -> String {
        format!("{}/{}", self.node_path(), host)
    }

    /// 从注册中心的key解析节点类型与地址，例如 /nodes/worker/10.0.0.1:1234
    pub fn parse_key(key: &str) -> Option<(NodeType, Host)> {
        let (node_type, rest) = if let Some(rest) = key.strip_prefix(MASTER_NODE_PATH) {
            (NodeType::Master, rest)
        } else if let Some(rest) = key.strip_prefix(WORKER_NODE_PATH) {
            (NodeType::Worker, rest)
        } else {
            return None;
        };
        let address = rest.strip_prefix('/')?;
        if address.contains('/') {
            return None;
        }
        address.parse().ok().map(|host| (node_type, host))
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Master => write!(f, "master"),
            NodeType::Worker => write!(f, "worker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let (node_type, host) = NodeType::parse_key("/nodes/worker/10.0.0.1:1234").unwrap();
        assert_eq!(node_type, NodeType::Worker);
        assert_eq!(host, Host::new("10.0.0.1", 1234));

        let (node_type, _) = NodeType::parse_key("/nodes/master/m1:5678").unwrap();
        assert_eq!(node_type, NodeType::Master);

        assert!(NodeType::parse_key("/nodes/worker").is_none());
        assert!(NodeType::parse_key("/nodes/worker/a/b:1").is_none());
        assert!(NodeType::parse_key("/lock/failover/master").is_none());
    }

    #[test]
    fn test_node_key() {
        let host = Host::new("10.0.0.1", 1234);
        assert_eq!(
            NodeType::Master.node_key(&host),
            "/nodes/master/10.0.0.1:1234"
        );
        assert_eq!(
            NodeType::Worker.failover_lock_path(),
            "/lock/failover/worker"
        );
    }
}
