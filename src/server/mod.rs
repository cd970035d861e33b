//! Thin HTTP surface over the orchestrator.
//!
//! Sync endpoints are fire-and-forget: they return 202 and the work runs in
//! a background task. A second sync request while one is running gets a 409.

use crate::ledger::LedgerStore;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressTracker;
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone)]
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub ledger: Arc<dyn LedgerStore>,
    pub progress: ProgressTracker,
}

#[derive(Serialize)]
struct StatusResponse {
    is_running: bool,
    operation: Option<String>,
    ledger: crate::ledger::LedgerStats,
}

async fn get_status(State(state): State<ServerState>) -> Response {
    let progress = state.progress.snapshot();
    match state.ledger.stats() {
        Ok(ledger) => Json(StatusResponse {
            is_running: progress.is_running,
            operation: progress.operation,
            ledger,
        })
        .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    }
}

async fn get_progress(State(state): State<ServerState>) -> Response {
    Json(state.progress.snapshot()).into_response()
}

/// 409 when an operation is running, otherwise spawn `work` and return 202.
fn spawn_operation<F>(state: &ServerState, name: &'static str, work: F) -> Response
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    if state.progress.is_running() {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "another operation is already running" })),
        )
            .into_response();
    }
    tokio::spawn(async move {
        if let Err(e) = work.await {
            error!("{} failed: {:#}", name, e);
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "started": name }))).into_response()
}

async fn post_sync(State(state): State<ServerState>) -> Response {
    let orchestrator = state.orchestrator.clone();
    spawn_operation(&state, "full_sync", async move {
        let report = orchestrator.run_full_sync().await?;
        info!(
            "Full sync done: {} acquired, {} skipped, {} failed",
            report.acquired, report.skipped, report.failed
        );
        Ok(())
    })
}

async fn post_sync_playlist(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    let orchestrator = state.orchestrator.clone();
    spawn_operation(&state, "playlist_sync", async move {
        let report = orchestrator.run_playlist_sync(&id).await?;
        info!(
            "Playlist sync done: {} acquired, {} skipped, {} failed",
            report.acquired, report.skipped, report.failed
        );
        Ok(())
    })
}

async fn post_reclassify(State(state): State<ServerState>) -> Response {
    let orchestrator = state.orchestrator.clone();
    spawn_operation(&state, "reclassify", async move {
        let report = orchestrator.run_reclassify().await?;
        info!(
            "Reclassify done: {} moved, {} unchanged, {} failed",
            report.moved, report.unchanged, report.failed
        );
        Ok(())
    })
}

pub fn make_router(state: ServerState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/progress", get(get_progress))
        .route("/api/sync", post(post_sync))
        .route("/api/sync/playlist/{id}", post(post_sync_playlist))
        .route("/api/reclassify", post(post_reclassify))
        .with_state(state)
}

pub async fn run(port: u16, state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let app = make_router(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Listening on 127.0.0.1:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
