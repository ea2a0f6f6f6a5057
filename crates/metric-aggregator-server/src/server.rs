//! HTTP/1 server: accept loop, routing, request tracing and graceful shutdown.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use metric_aggregator::{
    ConceptMetricsService, ConceptMetricsSource, GraphAnnotationsCounter, GraphDriver,
    HealthProbe, Neo4jHttpDriver, RequestContext,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, APP_DESCRIPTION};
use crate::handlers::{get_metrics, json_error, json_response, text_response};
use crate::health::{build_info, HealthService};

pub(crate) const METRICS_PATH: &str = "/concepts/metrics";
pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub(crate) struct ServerState {
    pub config: ServerConfig,
    pub metrics: Arc<dyn ConceptMetricsSource>,
    pub health: HealthService,
}

impl ServerState {
    /// Wires the metrics pipeline and the health checks over one driver.
    pub fn new(config: ServerConfig, driver: Arc<dyn GraphDriver>) -> Self {
        let counter = GraphAnnotationsCounter::new(driver.clone(), config.recent_window);
        let metrics = Arc::new(ConceptMetricsService::new(Arc::new(counter)));
        let health = HealthService::new(
            &config.app_system_code,
            &config.app_name,
            APP_DESCRIPTION,
            HealthProbe::new(driver),
        );
        Self {
            config,
            metrics,
            health,
        }
    }
}

pub(crate) async fn serve(config: ServerConfig) -> Result<()> {
    let driver = Neo4jHttpDriver::new(&config.neo4j)
        .map_err(|e| anyhow!("failed to create neo4j driver: {e}"))?;
    let state = Arc::new(ServerState::new(config, Arc::new(driver)));
    serve_async(state).await
}

async fn serve_async(state: Arc<ServerState>) -> Result<()> {
    let listen = state.config.listen;
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow!("failed to bind {listen}: {e}"))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("failed to read bound addr: {e}"))?;

    info!(addr = %bound, "listening");
    if let Some(path) = state.config.ready_file.as_ref() {
        let payload = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "addr": bound.to_string(),
            "pid": std::process::id(),
        });
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::write(path, serde_json::to_string_pretty(&payload).unwrap_or_default())
            .map_err(|e| anyhow!("failed to write ready file {}: {e}", path.display()))?;
    }

    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let state = state.clone();
                let service = service_fn(move |req| handle_request(req, state.clone(), peer));
                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(HEADER_READ_TIMEOUT)
                    .serve_connection(io, service);
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(peer = %peer, error = %e, "connection error");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, draining connections");
                break;
            }
        }
    }

    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => info!("all connections closed"),
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "shutdown grace period elapsed with open connections");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Takes the caller's `X-Request-Id`, or mints one.
pub(crate) fn transaction_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("tid_{}", uuid::Uuid::new_v4().simple()))
}

fn is_supervisory(path: &str) -> bool {
    matches!(path, "/__health" | "/__gtg" | "/__build-info")
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let ctx = RequestContext::new(transaction_id(req.headers()));

    let mut resp = route(&state, &method, &path, req.uri().query(), &ctx).await;

    if let Ok(value) = HeaderValue::from_str(&ctx.transaction_id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    if !is_supervisory(&path) {
        info!(
            method = %method,
            path = %path,
            status = resp.status().as_u16(),
            transaction_id = %ctx.transaction_id,
            peer = %peer,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request handled"
        );
    }
    Ok(resp)
}

pub(crate) async fn route(
    state: &ServerState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    ctx: &RequestContext,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, METRICS_PATH) => {
            let handler = get_metrics(
                state.metrics.as_ref(),
                ctx,
                query,
                state.config.max_request_batch_size,
            );
            match tokio::time::timeout(state.config.handler_timeout, handler).await {
                Ok(resp) => resp,
                Err(_) => {
                    warn!(transaction_id = %ctx.transaction_id, "metrics request timed out");
                    json_error(StatusCode::SERVICE_UNAVAILABLE, "request timed out")
                }
            }
        }
        (_, METRICS_PATH) => json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        (&Method::GET, "/__health") => json_response(StatusCode::OK, &state.health.report().await),
        (&Method::GET, "/__gtg") => {
            let status = state.health.gtg().await;
            if status.good_to_go {
                text_response(StatusCode::OK, &status.message)
            } else {
                text_response(StatusCode::SERVICE_UNAVAILABLE, &status.message)
            }
        }
        (&Method::GET, "/__build-info") => json_response(StatusCode::OK, &build_info()),
        _ => json_error(StatusCode::NOT_FOUND, &format!("no route for {method} {path}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use metric_aggregator::{ConceptResult, FailureMode, InMemoryGraph, MetricsError};

    fn state_with(graph: Arc<InMemoryGraph>) -> ServerState {
        ServerState::new(test_config(10), graph)
    }

    async fn body_bytes(resp: Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    async fn get(state: &ServerState, path: &str, query: Option<&str>) -> Response<Full<Bytes>> {
        route(state, &Method::GET, path, query, &RequestContext::new("tid_test")).await
    }

    struct Stalled;

    #[async_trait]
    impl ConceptMetricsSource for Stalled {
        async fn concept_metrics(
            &self,
            _ctx: &RequestContext,
            _uuids: &[String],
        ) -> Result<Vec<ConceptResult>, MetricsError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn metrics_route_serves_graph_counts() {
        let graph = Arc::new(InMemoryGraph::new());
        graph.add_concept_with_annotations("a", 1, 4, 1);
        let state = state_with(graph);

        let resp = get(&state, METRICS_PATH, Some("uuids=a,missing")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(
            v,
            serde_json::json!([
                {"uuid": "a", "metrics": {"annotationsCount": 4, "prevWeekAnnotationsCount": 1}}
            ])
        );
    }

    #[tokio::test]
    async fn non_get_on_metrics_is_405() {
        let state = state_with(Arc::new(InMemoryGraph::new()));
        let resp = route(
            &state,
            &Method::POST,
            METRICS_PATH,
            None,
            &RequestContext::default(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_path_is_404_json() {
        let state = state_with(Arc::new(InMemoryGraph::new()));
        let resp = get(&state, "/nope", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert!(v["message"].as_str().unwrap().contains("/nope"));
    }

    #[tokio::test]
    async fn stalled_service_times_out_with_503() {
        let mut config = test_config(10);
        config.handler_timeout = Duration::from_millis(20);
        let mut state = ServerState::new(config, Arc::new(InMemoryGraph::new()));
        state.metrics = Arc::new(Stalled);

        let resp = get(&state, METRICS_PATH, Some("uuids=a")).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(v["message"], "request timed out");
    }

    #[tokio::test]
    async fn gtg_reflects_store_connectivity() {
        let graph = Arc::new(InMemoryGraph::new());
        let state = state_with(graph.clone());

        let resp = get(&state, "/__gtg", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_bytes(resp).await, Bytes::from_static(b"OK"));

        graph.set_failure_mode(FailureMode::Unreachable);
        let resp = get(&state, "/__gtg", None).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let text = String::from_utf8(body_bytes(resp).await.to_vec()).unwrap();
        assert!(text.starts_with("cannot connect to the graph store"), "{text}");
    }

    #[tokio::test]
    async fn health_is_200_even_when_unhealthy() {
        let graph = Arc::new(InMemoryGraph::new());
        graph.set_failure_mode(FailureMode::Unreachable);
        let state = state_with(graph);

        let resp = get(&state, "/__health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(v["ok"], false);
        assert_eq!(v["systemCode"], "test-system-code");
        assert_eq!(v["name"], "test-neo4j-metric-aggregator");
        assert_eq!(v["checks"][0]["ok"], false);
    }

    #[tokio::test]
    async fn build_info_carries_the_package_version() {
        let state = state_with(Arc::new(InMemoryGraph::new()));
        let resp = get(&state, "/__build-info", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
        assert!(v["dateTime"].is_string());
    }

    #[test]
    fn transaction_id_is_taken_from_header_or_minted() {
        let mut headers = HeaderMap::new();
        assert!(transaction_id(&headers).starts_with("tid_"));

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("tid_abc"));
        assert_eq!(transaction_id(&headers), "tid_abc");

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("   "));
        assert!(transaction_id(&headers).starts_with("tid_"));
    }

    #[test]
    fn supervisory_paths_are_recognised() {
        assert!(is_supervisory("/__gtg"));
        assert!(!is_supervisory(METRICS_PATH));
    }
}
