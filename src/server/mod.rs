//! HTTP surface
//!
//! A single-purpose axum app: `POST /negotiate` runs one negotiation
//! session, `GET /health` answers liveness probes. Session-level faults
//! come back as `500 {"detail": ...}` with no partial ledger; soft
//! per-call faults never reach this layer, they only show up in the
//! response's error counters.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use entente_core::{NegotiateRequest, ServerConfig, SessionService};

pub struct AppState {
    pub service: SessionService,
}

pub fn app(config: ServerConfig) -> Router {
    let state = Arc::new(AppState {
        service: SessionService::new(config),
    });
    Router::new()
        .route("/negotiate", post(negotiate))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(config: ServerConfig, listener: TcpListener) -> anyhow::Result<()> {
    info!("entente listening on {}", listener.local_addr()?);
    axum::serve(listener, app(config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        return;
    }
    info!("shutdown signal received, draining");
}

async fn health() -> &'static str {
    "ok"
}

async fn negotiate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NegotiateRequest>,
) -> Response {
    let started = Instant::now();
    info!(
        powers = request.agent_state.len(),
        max_rounds = request.max_rounds,
        "negotiate request received"
    );

    // The request's lifetime bounds the session; dropping the connection
    // does not, so cancellation stays a caller-side concern for now.
    let cancel = CancellationToken::new();
    match state.service.run(request, cancel).await {
        Ok(response) => {
            info!(
                agreements = response.agreed_statements.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "negotiate request finished"
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("negotiate request failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": e.to_string()})),
            )
                .into_response()
        }
    }
}
