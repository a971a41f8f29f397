// Exposes Prometheus metrics and health checks over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use warp::Filter;

use crate::{health::HealthChecker, metrics::MetricsRegistry};

pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthChecker>,
    shutdown: CancellationToken,
) {
    let metrics_route = warp::path("metrics")
        .and(warp::get())
        .and(with_metrics(metrics))
        .and_then(handle_metrics);

    let health_route = warp::path("health")
        .and(warp::get())
        .and(with_health_checker(health))
        .and_then(handle_health);

    let root_route = warp::path::end()
        .and(warp::get())
        .map(|| "quotebot - /metrics, /health");

    let routes = metrics_route.or(health_route).or(root_route);

    let signal = async move { shutdown.cancelled().await };
    match warp::serve(routes).try_bind_with_graceful_shutdown(addr, signal) {
        Ok((bound, server)) => {
            info!(addr = %bound, "Metrics server listening");
            server.await;
        }
        Err(err) => error!(addr = %addr, error = %err, "Failed to bind metrics server"),
    }
}

fn with_metrics(
    metrics: Arc<MetricsRegistry>,
) -> impl Filter<Extract = (Arc<MetricsRegistry>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || metrics.clone())
}

fn with_health_checker(
    health_checker: Arc<HealthChecker>,
) -> impl Filter<Extract = (Arc<HealthChecker>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || health_checker.clone())
}

async fn handle_metrics(metrics: Arc<MetricsRegistry>) -> Result<impl warp::Reply, warp::Rejection> {
    let metrics_text = metrics.gather_metrics();
    Ok(warp::reply::with_header(
        metrics_text,
        "Content-Type",
        "text/plain; version=0.0.4; charset=utf-8",
    ))
}

async fn handle_health(health_checker: Arc<HealthChecker>) -> Result<impl warp::Reply, warp::Rejection> {
    let health_status = health_checker.get_overall_health().await;

    let json_response = serde_json::to_string_pretty(&health_status)
        .unwrap_or_else(|_| "{\"error\": \"Failed to serialize health status\"}".to_string());

    Ok(warp::reply::with_header(
        json_response,
        "Content-Type",
        "application/json",
    ))
}
