use crate::result::{ErrCvt, RDResult, RdConfigErr};
use crate::sys::NodeID;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone)]
pub struct NodesConfig {
    pub peers: HashMap<NodeID, NodeConfig>,
    pub this: (NodeID, NodeConfig),
    pub file_dir: PathBuf,
}

impl NodesConfig {
    pub fn get_nodeconfig(&self, id: NodeID) -> &NodeConfig {
        if self.this.0 == id {
            &self.this.1
        } else {
            self.peers.get(&id).unwrap_or_else(|| {
                panic!("peers {:?}", self.peers);
            })
        }
    }
    pub fn node_cnt(&self) -> usize {
        self.peers.len() + 1
    }
    pub fn this_node(&self) -> NodeID {
        self.this.0
    }
    /// 本节点在快照中使用的集群唯一标识
    pub fn this_node_id(&self) -> String {
        format!("node-{}", self.this.0)
    }
    pub fn get_master_node(&self) -> NodeID {
        if self.this.1.is_master() {
            return self.this.0;
        }
        *self
            .peers
            .iter()
            .find(|(_, config)| config.is_master())
            .unwrap_or_else(|| {
                panic!("peers {:?}", self.peers);
            })
            .0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub addr: SocketAddr,
    domain: Option<String>,
    pub spec: HashSet<String>,
}

impl NodeConfig {
    pub fn is_master(&self) -> bool {
        self.spec.contains("master")
    }
    pub fn is_worker(&self) -> bool {
        self.spec.contains("worker")
    }
    fn get_http_domain<'a>(&'a self) -> Option<&'a str> {
        // check domain valid
        self.domain
            .as_ref()
            .filter(|d| {
                let ok = d.starts_with("http://") || d.starts_with("https://");
                if !ok {
                    tracing::warn!(
                        "Current domain is {}, domain should starts with http:// or https://",
                        d
                    );
                }
                ok
            })
            .map(|d| &**d)
    }

    pub fn http_url(&self) -> String {
        self.get_http_domain()
            .map(|d| d.to_string())
            .unwrap_or_else(|| format!("http://{}:{}", self.addr.ip(), self.addr.port() + 1))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct YamlConfig {
    pub nodes: HashMap<NodeID, NodeConfig>,
}

fn read_yaml_config(file_path: impl AsRef<Path>) -> RDResult<YamlConfig> {
    let path = file_path.as_ref().to_owned();
    let file = std::fs::File::open(&path)
        .map_err(|err| RdConfigErr::ReadConfigFailed { path, err })?;
    serde_yaml::from_reader(file).map_err(|e| ErrCvt(e).to_rd_config_err())
}

pub fn read_config(this_id: NodeID, file_path: impl AsRef<Path>) -> RDResult<NodesConfig> {
    let config_path = file_path.as_ref().join("files/node_config.yaml");
    let mut yaml_config = read_yaml_config(config_path)?;

    let this = yaml_config
        .nodes
        .remove(&this_id)
        .ok_or(RdConfigErr::NodeNotFound { id: this_id })?;

    Ok(NodesConfig {
        this: (this_id, this),
        peers: yaml_config.nodes,
        file_dir: file_path.as_ref().to_path_buf(),
    })
}

#[cfg(test)]
pub fn test_nodes_config(this_id: NodeID) -> NodesConfig {
    let node0: NodeConfig = serde_yaml::from_str(
        r#"
addr: 127.0.0.1:2303
spec: [master]
"#,
    )
    .unwrap();

    let node1: NodeConfig = serde_yaml::from_str(
        r#"
addr: 127.0.0.1:2307
spec: [worker]
"#,
    )
    .unwrap();

    let mut nodes = HashMap::new();
    let _ = nodes.insert(0, node0);
    let _ = nodes.insert(1, node1);
    let this = nodes.remove(&this_id).unwrap();

    NodesConfig {
        this: (this_id, this),
        peers: nodes,
        file_dir: "test_temp_dir".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_node_config_yaml() {
        let node: NodeConfig = serde_yaml::from_str(
            r#"
addr: 127.0.0.1:2303
spec: [master]
"#,
        )
        .unwrap();
        assert!(node.is_master());
        assert!(!node.is_worker());
        assert_eq!(node.http_url(), "http://127.0.0.1:2304");
    }

    #[test]
    fn domain_overrides_http_url() {
        let node: NodeConfig = serde_yaml::from_str(
            r#"
addr: 127.0.0.1:2303
domain: https://dash.example.com
spec: [master]
"#,
        )
        .unwrap();
        assert_eq!(node.http_url(), "https://dash.example.com");
    }

    #[test]
    fn read_config_splits_this_and_peers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let files_dir = temp_dir.path().join("files");
        std::fs::create_dir_all(&files_dir).unwrap();
        std::fs::write(
            files_dir.join("node_config.yaml"),
            r#"
nodes:
  0:
    addr: 127.0.0.1:2303
    spec: [master]
  1:
    addr: 127.0.0.1:2307
    spec: [worker]
"#,
        )
        .unwrap();

        let config = read_config(1, temp_dir.path()).unwrap();
        assert_eq!(config.this_node(), 1);
        assert_eq!(config.this_node_id(), "node-1");
        assert_eq!(config.node_cnt(), 2);
        assert_eq!(config.get_master_node(), 0);
        assert!(config.this.1.is_worker());
    }

    #[test]
    fn read_config_unknown_node_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let files_dir = temp_dir.path().join("files");
        std::fs::create_dir_all(&files_dir).unwrap();
        std::fs::write(
            files_dir.join("node_config.yaml"),
            r#"
nodes:
  0:
    addr: 127.0.0.1:2303
    spec: [master]
"#,
        )
        .unwrap();

        assert!(read_config(7, temp_dir.path()).is_err());
    }
}
