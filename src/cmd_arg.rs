use clap::Parser;

use crate::sys::NodeID;

/// 节点启动参数
#[derive(Parser, Debug)]
pub struct CmdArgs {
    /// 本节点在 node_config.yaml 中的 id
    pub this_id: NodeID,
    /// 配置目录（其下应有 files/node_config.yaml）
    pub config_dir: String,
}
