// raylet_dash/src/master/metrics/aggregator.rs
use crate::general::metrics::Raylet;
use crate::result::RDResult;
use crate::sys::{LogicalModule, LogicalModuleNewArgs};
use crate::util::{unix_now_secs, JoinHandleWrapper};
use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use self::prometheus::{MeasureLabels, Metrics, NodeLabels};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const STALE_AFTER_SECS: u64 = 300;

pub mod prometheus {
    use std::sync::atomic::AtomicU64;

    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::gauge::Gauge;
    use prometheus_client::registry::Registry;

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    pub struct MeasureLabels {
        pub node_id: String,
        pub view: String,
        pub tags: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    pub struct NodeLabels {
        pub node_id: String,
    }

    pub struct Metrics {
        pub scalars: Family<MeasureLabels, Gauge<f64, AtomicU64>>,
        pub workers: Family<NodeLabels, Gauge>,
    }

    pub fn new_registry_and_metrics() -> (Metrics, Registry) {
        let mut registry = Registry::default();
        let metrics = Metrics {
            scalars: Family::default(),
            workers: Family::default(),
        };
        registry.register(
            "raylet_scalar_measure",
            "Scalar view measures reported by each node",
            metrics.scalars.clone(),
        );
        registry.register(
            "raylet_num_workers",
            "Worker process count per node",
            metrics.workers.clone(),
        );
        (metrics, registry)
    }
}

pub struct StampedRaylet {
    pub raylet: Raylet,
    pub recv_ts: u64,
}

// 节点 id 到最新快照的映射
#[derive(Default)]
pub struct AggregatedRaylets {
    pub raylets: HashMap<String, StampedRaylet>,
}

/// Master 节点上的指标聚合器
/// 1. 负责接收并校验各节点上报的 Raylet 快照
/// 2. 维护 Prometheus 指标注册表供采样接口使用
pub struct MetricsAggregator {
    raylets: Arc<Mutex<AggregatedRaylets>>,
    pub registry: Registry,
    metrics: Metrics,
}

#[async_trait]
impl LogicalModule for MetricsAggregator {
    fn inner_new(_args: LogicalModuleNewArgs) -> Self {
        let (metrics, registry) = prometheus::new_registry_and_metrics();
        Self {
            raylets: Arc::new(Mutex::new(AggregatedRaylets::default())),
            registry,
            metrics,
        }
    }

    async fn init(&self) -> RDResult<()> {
        tracing::info!("指标聚合器已初始化");
        Ok(())
    }

    async fn start(&self) -> RDResult<Vec<JoinHandleWrapper>> {
        // 定期清理过期快照
        let raylets = self.raylets.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(SWEEP_INTERVAL);

            loop {
                interval.tick().await;
                let now = unix_now_secs();
                let (before, after) = {
                    let mut locked = raylets.lock();
                    retain_fresh(&mut locked.raylets, now)
                };
                if before != after {
                    tracing::info!("清理过期节点快照: {} -> {}", before, after);
                }
            }
        });

        tracing::info!("指标聚合器已启动");
        Ok(vec![JoinHandleWrapper::new(handle)])
    }
}

impl MetricsAggregator {
    /// 上报入口：解码 + 校验，不合法的记录拒收不入库
    pub fn ingest(&self, raw: &str) -> RDResult<()> {
        let raylet = Raylet::from_report_json(raw)?;
        self.insert_raylet(raylet);
        Ok(())
    }

    /// 存入一份已校验的快照，覆盖该节点上一份
    pub fn insert_raylet(&self, raylet: Raylet) {
        self.update_prometheus(&raylet);
        let node_id = raylet.node_id.clone();
        let stamped = StampedRaylet {
            raylet,
            recv_ts: unix_now_secs(),
        };
        let _ = self.raylets.lock().raylets.insert(node_id.clone(), stamped);
        tracing::debug!("收到节点 {} 的快照", node_id);
    }

    fn update_prometheus(&self, raylet: &Raylet) {
        let _ = self
            .metrics
            .workers
            .get_or_create(&NodeLabels {
                node_id: raylet.node_id.clone(),
            })
            .set(raylet.num_workers as i64);

        for view in &raylet.view_data {
            for measure in &view.measures {
                let value = match (measure.double_value, measure.int_value) {
                    (Some(d), _) => Some(d),
                    (None, Some(i)) => Some(i as f64),
                    (None, None) => None,
                };
                if let Some(value) = value {
                    let _ = self
                        .metrics
                        .scalars
                        .get_or_create(&MeasureLabels {
                            node_id: raylet.node_id.clone(),
                            view: view.view_name.clone(),
                            tags: measure.tags.clone(),
                        })
                        .set(value);
                }
            }
        }
    }

    pub fn all_raylets(&self) -> Vec<Raylet> {
        let locked = self.raylets.lock();
        let mut all: Vec<Raylet> = locked
            .raylets
            .values()
            .map(|stamped| stamped.raylet.clone())
            .collect();
        all.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        all
    }

    pub fn get_raylet(&self, node_id: &str) -> Option<Raylet> {
        self.raylets
            .lock()
            .raylets
            .get(node_id)
            .map(|stamped| stamped.raylet.clone())
    }

    pub fn encode_prometheus(&self) -> String {
        let mut body = String::new();
        if let Err(err) = encode(&mut body, &self.registry) {
            tracing::error!("encode prometheus metrics failed: {:?}", err);
        }
        body
    }
}

fn retain_fresh(raylets: &mut HashMap<String, StampedRaylet>, now: u64) -> (usize, usize) {
    let before = raylets.len();
    raylets.retain(|_, stamped| now.saturating_sub(stamped.recv_ts) < STALE_AFTER_SECS);
    (before, raylets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_nodes_config;
    use crate::general::metrics::{ViewData, ViewMeasures};
    use crate::result::RDError;
    use crate::sys::test_module_args;

    fn test_aggregator() -> MetricsAggregator {
        MetricsAggregator::inner_new(test_module_args(test_nodes_config(0)))
    }

    fn sample_raylet(node_id: &str, num_workers: u64) -> Raylet {
        Raylet {
            view_data: vec![ViewData {
                view_name: "raylet_process_stats".to_owned(),
                measures: vec![
                    ViewMeasures::scalar_double("cpu_percent", 12.5),
                    ViewMeasures::scalar_int("memory_bytes", 4096),
                ],
            }],
            num_workers,
            pid: 1234,
            node_id: node_id.to_owned(),
            node_manager_port: 2307,
        }
    }

    #[test]
    fn ingest_valid_report_is_stored() {
        let aggregator = test_aggregator();
        let raylet = sample_raylet("node-1", 3);
        let raw = serde_json::to_string(&raylet).unwrap();

        aggregator.ingest(&raw).unwrap();

        let all = aggregator.all_raylets();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], raylet);
        assert_eq!(aggregator.get_raylet("node-1"), Some(raylet));
        assert_eq!(aggregator.get_raylet("node-9"), None);
    }

    #[test]
    fn ingest_replaces_previous_snapshot() {
        let aggregator = test_aggregator();
        let raw1 = serde_json::to_string(&sample_raylet("node-1", 3)).unwrap();
        let raw2 = serde_json::to_string(&sample_raylet("node-1", 5)).unwrap();

        aggregator.ingest(&raw1).unwrap();
        aggregator.ingest(&raw2).unwrap();

        let all = aggregator.all_raylets();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].num_workers, 5);
    }

    #[test]
    fn ingest_rejects_bucket_mismatch() {
        let aggregator = test_aggregator();
        let mut raylet = sample_raylet("node-1", 1);
        raylet.view_data.push(ViewData {
            view_name: "latency".to_owned(),
            measures: vec![ViewMeasures {
                tags: "".to_owned(),
                distribution_bucket_boundaries: Some(vec![1.0, 5.0]),
                distribution_bucket_counts: Some(vec![1]),
                ..Default::default()
            }],
        });
        let raw = serde_json::to_string(&raylet).unwrap();

        assert!(matches!(
            aggregator.ingest(&raw),
            Err(RDError::RdSchemaErr(_))
        ));
        assert!(aggregator.all_raylets().is_empty());
    }

    #[test]
    fn ingest_rejects_malformed_json() {
        let aggregator = test_aggregator();
        assert!(matches!(
            aggregator.ingest("not a raylet"),
            Err(RDError::RdTypeErr(_))
        ));
        assert!(aggregator.all_raylets().is_empty());
    }

    #[test]
    fn prometheus_export_contains_node_gauges() {
        let aggregator = test_aggregator();
        let raw = serde_json::to_string(&sample_raylet("node-1", 3)).unwrap();
        aggregator.ingest(&raw).unwrap();

        let body = aggregator.encode_prometheus();
        assert!(body.contains("raylet_num_workers"));
        assert!(body.contains("raylet_scalar_measure"));
        assert!(body.contains("node-1"));
    }

    #[test]
    fn retain_fresh_drops_stale_snapshots() {
        let mut raylets = HashMap::new();
        let _ = raylets.insert(
            "node-1".to_owned(),
            StampedRaylet {
                raylet: sample_raylet("node-1", 1),
                recv_ts: 1000,
            },
        );
        let _ = raylets.insert(
            "node-2".to_owned(),
            StampedRaylet {
                raylet: sample_raylet("node-2", 1),
                recv_ts: 1000 + STALE_AFTER_SECS - 1,
            },
        );

        let (before, after) = retain_fresh(&mut raylets, 1000 + STALE_AFTER_SECS);
        assert_eq!(before, 2);
        assert_eq!(after, 1);
        assert!(raylets.contains_key("node-2"));
    }
}
