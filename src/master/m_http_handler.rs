use async_trait::async_trait;
use axum::{
    extract::Path,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use tower_http::cors::CorsLayer;

use crate::{
    result::RDResult,
    sys::{LogicalModule, LogicalModuleNewArgs, LogicalModulesRef},
    util::JoinHandleWrapper,
};

use super::metrics::MetricsAggregator;

lazy_static::lazy_static!(
    static ref MASTER_HTTP_VIEW: OnceLock<LogicalModulesRef> = OnceLock::new();
);

/// Master 节点的 HTTP 入口，对接上报端与前端展示层
pub struct MasterHttpHandler {
    args: LogicalModuleNewArgs,
}

#[async_trait]
impl LogicalModule for MasterHttpHandler {
    fn inner_new(args: LogicalModuleNewArgs) -> Self {
        Self { args }
    }

    async fn start(&self) -> RDResult<Vec<JoinHandleWrapper>> {
        tracing::info!("start as master");

        let view = self.args.logical_modules_ref.clone();
        let port = self.args.nodes_config.this.1.addr.port() + 1;
        Ok(vec![JoinHandleWrapper::from(tokio::spawn(async move {
            start_http_server(view, port).await;
        }))])
    }
}

pub async fn start_http_server(view: LogicalModulesRef, port: u16) {
    let _ = MASTER_HTTP_VIEW.get_or_init(move || view);

    let addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port);
    let app = Router::new()
        .route("/report", post(report_handler))
        .route("/raylets", get(raylets_handler))
        .route("/raylets/:node_id", get(raylet_handler))
        .route("/metrics", get(prometheus_handler))
        .layer(CorsLayer::permissive());

    tracing::info!("http start on {}", addr);
    let server = match axum::Server::try_bind(&addr) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!("无法绑定到HTTP端口 {}: {}", port, err);
            return;
        }
    };
    if let Err(err) = server.serve(app.into_make_service()).await {
        tracing::error!("http server error: {}", err);
    }
    tracing::info!("http end on {}", addr);
}

fn with_aggregator<T>(f: impl FnOnce(&MetricsAggregator) -> T) -> Option<T> {
    let view = MASTER_HTTP_VIEW.get()?;
    let modules = view.inner.upgrade()?;
    let modules = modules.get()?;
    let aggregator = modules.metrics_aggregator.as_ref()?;
    Some(f(aggregator))
}

fn aggregator_gone() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "aggregator not running").into_response()
}

async fn report_handler(body: String) -> Response {
    match with_aggregator(|aggregator| aggregator.ingest(&body)) {
        Some(Ok(())) => (StatusCode::OK, "ok").into_response(),
        Some(Err(err)) => {
            tracing::warn!("rejected metrics report: {}", err);
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        None => aggregator_gone(),
    }
}

async fn raylets_handler() -> Response {
    match with_aggregator(|aggregator| aggregator.all_raylets()) {
        Some(raylets) => Json(raylets).into_response(),
        None => aggregator_gone(),
    }
}

async fn raylet_handler(Path(node_id): Path<String>) -> Response {
    match with_aggregator(|aggregator| aggregator.get_raylet(&node_id)) {
        Some(Some(raylet)) => Json(raylet).into_response(),
        Some(None) => (StatusCode::NOT_FOUND, "node not found").into_response(),
        None => aggregator_gone(),
    }
}

async fn prometheus_handler() -> Response {
    tracing::debug!("handle_prometheus");
    match with_aggregator(|aggregator| aggregator.encode_prometheus()) {
        Some(body) => {
            let mut resp = (StatusCode::OK, body).into_response();
            let _ = resp.headers_mut().insert(
                "content-type",
                HeaderValue::from_static(
                    "application/openmetrics-text; version=1.0.0; charset=utf-8",
                ),
            );
            resp
        }
        None => aggregator_gone(),
    }
}
