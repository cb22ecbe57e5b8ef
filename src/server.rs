//! HTTP surface: the scrape endpoint and the liveness probe.
//!
//! One scrape runs snapshot -> project -> sink render. Any failure in that
//! pipeline becomes a 500 for that scrape only; it never takes the process
//! down.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::metrics::{project, MetricsSink};
use crate::state::StateMirror;

/// Shared state for HTTP handlers.
pub struct AppState {
    pub mirror: Arc<StateMirror>,
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// GET /metrics - full current projection of the mirrored device state.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match render_metrics(&state.mirror) {
        Ok(body) => (
            [(header::CONTENT_TYPE, MetricsSink::content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Scrape failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error collecting metrics",
            )
                .into_response()
        },
    }
}

/// The scrape pipeline. Each call takes its own snapshot and builds its own
/// sink, so overlapping scrapes stay independent.
fn render_metrics(mirror: &StateMirror) -> Result<String> {
    let snapshot = mirror.snapshot();
    let samples = project(&snapshot);
    MetricsSink::new()?.render(&samples)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /healthz - process liveness only, never coupled to device state.
async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "up" })
}

/// Start the HTTP server.
pub async fn start_server(state: Arc<AppState>, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Serving metrics on http://{addr}/metrics");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind metrics server")?;

    axum::serve(listener, router)
        .await
        .context("Metrics server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ConnectionStatus, StateDelta, StreamingState};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app_state() -> Arc<AppState> {
        Arc::new(AppState {
            mirror: Arc::new(StateMirror::new()),
        })
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_exposition() {
        let state = app_state();
        state.mirror.set_status(ConnectionStatus::Connected);
        state.mirror.apply_delta(StateDelta {
            streaming: Some(StreamingState { active: true }),
            ..StateDelta::default()
        });

        let response = build_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn healthz_is_independent_of_device_state() {
        // Fully absent, disconnected mirror.
        let response = build_router(app_state())
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn health_body_is_status_up() {
        assert_eq!(
            serde_json::to_value(HealthResponse { status: "up" }).unwrap(),
            serde_json::json!({ "status": "up" })
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = build_router(app_state())
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn pipeline_renders_mirror_contents() {
        let mirror = StateMirror::new();
        mirror.set_status(ConnectionStatus::Connected);
        mirror.apply_delta(StateDelta {
            streaming: Some(StreamingState { active: true }),
            ..StateDelta::default()
        });

        let body = render_metrics(&mirror).unwrap();
        assert!(body.contains("atem_streaming_status{device_name=\"Unknown Device\"} 1"));
        assert!(body.contains("atem_connected{device_name=\"Unknown Device\"} 1"));
    }

    #[test]
    fn concurrent_scrapes_are_independent() {
        let mirror = Arc::new(StateMirror::new());
        mirror.apply_delta(StateDelta {
            streaming: Some(StreamingState { active: true }),
            ..StateDelta::default()
        });

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mirror = Arc::clone(&mirror);
                std::thread::spawn(move || render_metrics(&mirror).unwrap())
            })
            .collect();

        let bodies: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for body in &bodies {
            assert_eq!(body, &bodies[0]);
        }
    }
}
