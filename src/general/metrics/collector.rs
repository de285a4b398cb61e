// raylet_dash/src/general/metrics/collector.rs
use crate::result::{ErrCvt, RDResult, RDResultExt, RdNetErr};
use crate::sys::{LogicalModule, LogicalModuleNewArgs};
use crate::util::JoinHandleWrapper;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};
use tokio::time;

use super::types::Raylet;
use super::views::ViewRegistry;

pub const VIEW_PROCESS_STATS: &str = "raylet_process_stats";
pub const VIEW_REPORT_LOOP_LATENCY: &str = "raylet_report_loop_latency_ms";

const TAG_CPU_PERCENT: &str = "cpu_percent";
const TAG_MEMORY_BYTES: &str = "memory_bytes";

const REPORT_INTERVAL: Duration = Duration::from_secs(15);
const REPORT_LATENCY_BOUNDARIES_MS: [f64; 6] = [1.0, 5.0, 10.0, 50.0, 100.0, 500.0];

/// 指标收集器，负责收集本节点的运行指标
/// 每个上报周期重建一份 Raylet 快照；Worker 节点通过 HTTP 上报给
/// Master 节点，Master 节点直接写入本地聚合器
pub struct MetricsCollector {
    views: Arc<ViewRegistry>,
    http_client: reqwest::Client,
    args: LogicalModuleNewArgs,
    is_master: bool,
    pid: u32,
}

#[async_trait]
impl LogicalModule for MetricsCollector {
    fn inner_new(args: LogicalModuleNewArgs) -> Self {
        let views = Arc::new(ViewRegistry::new());

        // 注册进程指标视图，初始值为 0
        views.set_double(VIEW_PROCESS_STATS, TAG_CPU_PERCENT, 0.0);
        views.set_int(VIEW_PROCESS_STATS, TAG_MEMORY_BYTES, 0);
        views.register_distribution(
            VIEW_REPORT_LOOP_LATENCY,
            "",
            REPORT_LATENCY_BOUNDARIES_MS.to_vec(),
        );

        let is_master = args.nodes_config.this.1.is_master();
        let pid = std::process::id();

        Self {
            views,
            http_client: reqwest::Client::new(),
            args,
            is_master,
            pid,
        }
    }

    async fn init(&self) -> RDResult<()> {
        // 初始化时立即收集一次指标
        self.collect_process_metrics();
        tracing::info!(
            "指标收集器已初始化 (节点类型: {})",
            if self.is_master { "Master" } else { "Worker" }
        );
        Ok(())
    }

    async fn start(&self) -> RDResult<Vec<JoinHandleWrapper>> {
        let views = self.views.clone();
        let http_client = self.http_client.clone();
        let is_master = self.is_master;
        let pid = self.pid;
        let modules_ref = self.args.logical_modules_ref.clone();
        let node_id = self.args.nodes_config.this_node_id();
        let node_manager_port = self.args.nodes_config.this.1.addr.port();

        let master_config = self
            .args
            .nodes_config
            .get_nodeconfig(self.args.nodes_config.get_master_node())
            .clone();
        let master_url = master_config.http_url();
        let master_url = master_url.strip_suffix('/').unwrap_or(&master_url);
        let report_url = format!("{}/report", master_url);

        // 启动定期收集上报任务
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(REPORT_INTERVAL);
            let mut sys = System::new_all();

            loop {
                interval.tick().await;
                let loop_start = Instant::now();

                sys.refresh_all();

                if let Some(process) = sys.process(Pid::from_u32(pid)) {
                    let cpu_usage = process.cpu_usage();
                    let mem_usage = process.memory();
                    views.set_double(VIEW_PROCESS_STATS, TAG_CPU_PERCENT, cpu_usage as f64);
                    views.set_int(VIEW_PROCESS_STATS, TAG_MEMORY_BYTES, mem_usage as i64);

                    tracing::debug!("收集到本地指标: CPU={}%, 内存={}字节", cpu_usage, mem_usage);
                }

                // 本进程管理的 worker 数 = 以本进程为父进程的存活进程数
                let num_workers = sys
                    .processes()
                    .values()
                    .filter(|p| p.parent() == Some(Pid::from_u32(pid)))
                    .count() as u64;

                let raylet = Raylet {
                    view_data: views.snapshot(),
                    num_workers,
                    pid,
                    node_id: node_id.clone(),
                    node_manager_port,
                };
                if let Err(err) = raylet.validate() {
                    tracing::error!("本地快照校验失败，跳过本轮上报: {}", err);
                    continue;
                }

                if is_master {
                    // Master 节点直接写入本地聚合器
                    if let Some(modules) = modules_ref.inner.upgrade() {
                        if let Some(modules) = modules.get() {
                            if let Some(aggregator) = modules.metrics_aggregator.as_ref() {
                                aggregator.insert_raylet(raylet);
                            }
                        }
                    }
                } else {
                    send_report(&http_client, &report_url, &raylet)
                        .await
                        .todo_handle();
                }

                views.observe(
                    VIEW_REPORT_LOOP_LATENCY,
                    "",
                    loop_start.elapsed().as_millis() as f64,
                );
            }
        });

        tracing::info!("指标收集器已启动");
        Ok(vec![JoinHandleWrapper::new(handle)])
    }
}

impl MetricsCollector {
    /// 收集进程指标
    pub fn collect_process_metrics(&self) {
        let mut sys = System::new_all();
        sys.refresh_all();

        if let Some(process) = sys.process(Pid::from_u32(self.pid)) {
            self.views.set_double(
                VIEW_PROCESS_STATS,
                TAG_CPU_PERCENT,
                process.cpu_usage() as f64,
            );
            self.views
                .set_int(VIEW_PROCESS_STATS, TAG_MEMORY_BYTES, process.memory() as i64);
        }
    }
}

async fn send_report(
    client: &reqwest::Client,
    url: &str,
    raylet: &Raylet,
) -> RDResult<()> {
    let resp = client
        .post(url)
        .json(raylet)
        .send()
        .await
        .map_err(|e| ErrCvt(e).to_rd_net_err())?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let msg = resp.text().await.unwrap_or_default();
        return Err(RdNetErr::ReportRejected { status, msg }.into());
    }
    tracing::debug!("成功上报快照到Master节点");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_nodes_config;
    use crate::sys::test_module_args;

    #[test]
    fn process_views_registered_on_new() {
        let collector = MetricsCollector::inner_new(test_module_args(test_nodes_config(1)));
        let snapshot = collector.views.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|v| v.view_name.as_str()).collect();
        assert!(names.contains(&VIEW_PROCESS_STATS));
        assert!(names.contains(&VIEW_REPORT_LOOP_LATENCY));
        for view in &snapshot {
            view.validate().unwrap();
        }
    }

    #[test]
    fn collected_snapshot_builds_valid_raylet() {
        let collector = MetricsCollector::inner_new(test_module_args(test_nodes_config(1)));
        collector.collect_process_metrics();

        let raylet = Raylet {
            view_data: collector.views.snapshot(),
            num_workers: 0,
            pid: collector.pid,
            node_id: "node-1".to_owned(),
            node_manager_port: 2307,
        };
        raylet.validate().unwrap();
        assert_eq!(raylet.pid, std::process::id());
    }
}
