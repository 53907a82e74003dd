//! HTTP endpoints: search submission, queue controls, and inspection.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use super::channel::{ChannelConfig, StatusChannel};
use super::model::{Job, StatusEvent};
use super::queue::JobQueue;
use super::sink::ChannelSink;
use super::ws::ws_handler;
use crate::config::ServerConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub config: Arc<ServerConfig>,
}

/// A face-search submission.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// Base64 image, optionally as a `data:` URI. Validated by the executor.
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Build the Axum router with search, queue-control and WebSocket routes.
pub fn search_routes(queue: Arc<JobQueue>, config: Arc<ServerConfig>) -> Router {
    let body_limit = config.max_upload_bytes;
    let state = AppState { queue, config };

    Router::new()
        .route("/health", get(health))
        .route("/api/search", post(submit_search))
        .route("/ws/search", get(ws_handler))
        .route("/api/queue", get(queue_snapshot))
        .route("/api/queue/move", post(move_to_front))
        .route("/api/queue/pause", post(set_running))
        .route("/api/jobs/{id}/position", get(job_position))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Enqueue a submission and open its status channel.
pub(crate) fn start_search(state: &AppState, request: SearchRequest) -> ReceiverStream<StatusEvent> {
    let job = Job::new(request.image, state.config.resolve_top_k(request.top_k));
    let (sink, events) = ChannelSink::new(job.id);
    let id = state.queue.enqueue(job, Arc::new(sink));
    StatusChannel::open(
        Arc::clone(&state.queue),
        id,
        events,
        ChannelConfig::from(state.config.as_ref()),
    )
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "face-queue"
    }))
}

// ── Search ──────────────────────────────────────────────────────────────

/// Stream status events as newline-delimited JSON until the job ends.
/// A body that isn't a submission gets a single `error` line instead.
async fn submit_search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Unrecognized search submission");
            let event = StatusEvent::error("Invalid submission", Some(rejection.body_text()));
            return ndjson(
                rejection.status(),
                Body::from_stream(futures::stream::iter([ndjson_line(&event)])),
            );
        }
    };

    let lines = start_search(&state, request).map(|event| ndjson_line(&event));
    ndjson(StatusCode::OK, Body::from_stream(lines))
}

fn ndjson_line(event: &StatusEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event).map(|mut line| {
        line.push('\n');
        line
    })
}

fn ndjson(status: StatusCode, body: Body) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

// ── Queue Controls ──────────────────────────────────────────────────────

async fn queue_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.queue.snapshot())
}

#[derive(Deserialize)]
struct MoveRequest {
    index: i64,
}

async fn move_to_front(
    State(state): State<AppState>,
    Json(body): Json<MoveRequest>,
) -> impl IntoResponse {
    let Ok(index) = usize::try_from(body.index) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": format!("Invalid index {}", body.index)})),
        );
    };

    match state.queue.move_to_front(index) {
        Ok(job_id) => {
            info!(job_id = %job_id, index, "Job moved to front via API");
            (
                StatusCode::OK,
                Json(serde_json::json!({"status": "moved", "jobId": job_id})),
            )
        }
        Err(e) => {
            warn!(index, error = %e, "Move rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

#[derive(Deserialize)]
struct PauseRequest {
    running: bool,
}

async fn set_running(
    State(state): State<AppState>,
    Json(body): Json<PauseRequest>,
) -> impl IntoResponse {
    let running = state.queue.pause(!body.running);
    Json(serde_json::json!({
        "status": if running { "running" } else { "paused" },
        "running": running,
    }))
}

async fn job_position(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let job_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid job ID"})),
            );
        }
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "jobId": job_id,
            "position": state.queue.position(job_id),
            "state": state.queue.state_of(job_id),
        })),
    )
}
