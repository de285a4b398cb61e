use serde::{Deserialize, Serialize};

use crate::result::{RDResult, RdSchemaErr, RdTypeErr};

// 与前端交换的节点快照结构，线上字段名固定为 camelCase
// 可选字段缺省时整个字段不出现（不是 null）

/// 视图内某个标签的一次统计采样，标量或分布摘要二选一填充
/// （结构上不互斥，校验层保持宽松）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewMeasures {
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_bucket_boundaries: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_bucket_counts: Option<Vec<u64>>,
}

impl ViewMeasures {
    pub fn scalar_int(tags: impl Into<String>, value: i64) -> Self {
        Self {
            tags: tags.into(),
            int_value: Some(value),
            ..Default::default()
        }
    }

    pub fn scalar_double(tags: impl Into<String>, value: f64) -> Self {
        Self {
            tags: tags.into(),
            double_value: Some(value),
            ..Default::default()
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.int_value.is_some() || self.double_value.is_some()
    }

    pub fn is_distribution(&self) -> bool {
        self.distribution_min.is_some()
            || self.distribution_mean.is_some()
            || self.distribution_max.is_some()
            || self.distribution_count.is_some()
            || self.distribution_bucket_boundaries.is_some()
            || self.distribution_bucket_counts.is_some()
    }

    pub fn validate(&self) -> RDResult<()> {
        // 两个桶序列都在时长度必须一致
        if let (Some(boundaries), Some(counts)) = (
            self.distribution_bucket_boundaries.as_ref(),
            self.distribution_bucket_counts.as_ref(),
        ) {
            if boundaries.len() != counts.len() {
                return Err(RdSchemaErr::BucketLenMismatch {
                    tags: self.tags.clone(),
                    boundaries: boundaries.len(),
                    counts: counts.len(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// 某个具名指标视图及其按产出顺序排列的采样
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewData {
    pub view_name: String,
    pub measures: Vec<ViewMeasures>,
}

impl ViewData {
    pub fn validate(&self) -> RDResult<()> {
        if self.view_name.is_empty() {
            return Err(RdSchemaErr::EmptyViewName.into());
        }
        for measures in &self.measures {
            measures.validate()?;
        }
        Ok(())
    }
}

/// 单个节点管理进程的即时快照，每个上报周期重建一次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Raylet {
    pub view_data: Vec<ViewData>,
    pub num_workers: u64,
    pub pid: u32,
    pub node_id: String,
    pub node_manager_port: u16,
}

impl Raylet {
    pub fn validate(&self) -> RDResult<()> {
        if self.node_id.is_empty() {
            return Err(RdSchemaErr::EmptyNodeId.into());
        }
        if self.node_manager_port == 0 {
            return Err(RdSchemaErr::InvalidNodeManagerPort {
                node_id: self.node_id.clone(),
            }
            .into());
        }
        for view in &self.view_data {
            view.validate()?;
        }
        Ok(())
    }

    /// 上报入口：解码失败归为类型错误，结构规则不满足归为 schema 错误
    pub fn from_report_json(raw: &str) -> RDResult<Raylet> {
        let raylet: Raylet = serde_json::from_str(raw).map_err(|err| RdTypeErr::JsonDecode {
            err,
            context: "raylet report".to_owned(),
        })?;
        raylet.validate()?;
        Ok(raylet)
    }
}
