use crate::{
    config::NodesConfig,
    general::metrics::MetricsCollector,
    master::{m_http_handler::MasterHttpHandler, metrics::MetricsAggregator},
    result::RDResult,
    util::JoinHandleWrapper,
};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::Mutex;

pub type NodeID = u32;

pub struct Sys {
    logical_modules: Arc<OnceLock<LogicalModules>>,
    sub_tasks: Mutex<Vec<JoinHandleWrapper>>,
}

impl Drop for Sys {
    fn drop(&mut self) {
        tracing::info!("drop sys");
    }
}

impl Sys {
    pub fn new(config: NodesConfig) -> Sys {
        tracing::info!(
            "Running at dir: {:?}, cluster has {} nodes",
            config.file_dir,
            config.node_cnt()
        );

        Sys {
            logical_modules: LogicalModules::new(config),
            sub_tasks: Vec::new().into(),
        }
    }

    pub fn new_logical_modules_ref(&self) -> LogicalModulesRef {
        LogicalModulesRef {
            inner: Arc::downgrade(&self.logical_modules),
        }
    }

    pub async fn wait_for_end(&mut self) {
        let modules = self
            .logical_modules
            .get()
            .unwrap_or_else(|| panic!("logical modules not constructed"));
        if let Err(err) = modules.start(self).await {
            panic!("start logical modules error: {:?}", err);
        }
        tracing::info!("modules all started, waiting for end");
        for task in self.sub_tasks.lock().await.iter_mut() {
            task.join().await;
        }
    }
}

#[derive(Clone)]
pub struct LogicalModulesRef {
    pub inner: Weak<OnceLock<LogicalModules>>,
}

#[derive(Clone)]
pub struct LogicalModuleNewArgs {
    pub logical_modules_ref: LogicalModulesRef,
    pub nodes_config: NodesConfig,
}

#[async_trait]
pub trait LogicalModule: Send + Sync + 'static {
    fn inner_new(args: LogicalModuleNewArgs) -> Self
    where
        Self: Sized;
    async fn start(&self) -> RDResult<Vec<JoinHandleWrapper>>;

    async fn init(&self) -> RDResult<()> {
        Ok(())
    }
}

pub struct LogicalModules {
    // 所有节点都运行收集器
    pub metrics_collector: MetricsCollector,
    // 仅 Master 节点运行的模块
    pub metrics_aggregator: Option<MetricsAggregator>,
    pub master_http: Option<MasterHttpHandler>,
}

impl LogicalModules {
    pub fn new(config: NodesConfig) -> Arc<OnceLock<LogicalModules>> {
        let arc = Arc::new(OnceLock::new());
        let args = LogicalModuleNewArgs {
            logical_modules_ref: LogicalModulesRef {
                inner: Arc::downgrade(&arc),
            },
            nodes_config: config.clone(),
        };

        let is_master = config.this.1.is_master();
        assert!(is_master || config.this.1.is_worker());

        let logical_modules = LogicalModules {
            metrics_collector: MetricsCollector::inner_new(args.clone()),
            metrics_aggregator: is_master.then(|| MetricsAggregator::inner_new(args.clone())),
            master_http: is_master.then(|| MasterHttpHandler::inner_new(args.clone())),
        };
        let _ = arc.set(logical_modules);
        arc
    }

    pub async fn start(&self, sys: &Sys) -> RDResult<()> {
        self.metrics_collector.init().await?;
        if let Some(aggregator) = self.metrics_aggregator.as_ref() {
            aggregator.init().await?;
        }
        if let Some(http) = self.master_http.as_ref() {
            http.init().await?;
        }

        sys.sub_tasks
            .lock()
            .await
            .append(&mut self.metrics_collector.start().await?);
        if let Some(aggregator) = self.metrics_aggregator.as_ref() {
            sys.sub_tasks.lock().await.append(&mut aggregator.start().await?);
        }
        if let Some(http) = self.master_http.as_ref() {
            sys.sub_tasks.lock().await.append(&mut http.start().await?);
        }
        Ok(())
    }
}

#[cfg(test)]
pub fn test_module_args(nodes_config: NodesConfig) -> LogicalModuleNewArgs {
    LogicalModuleNewArgs {
        logical_modules_ref: LogicalModulesRef { inner: Weak::new() },
        nodes_config,
    }
}
