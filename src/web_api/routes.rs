//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::error::Result;
use crate::models::{ApiResponse, RefreshResponse, StreamErrorReport};
use crate::state::AppState;
use crate::stream_supervisor::StreamLocator;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Device
        .route("/api/device/status", get(device_status))
        .route("/api/device/stream", get(stream_locator))
        .route("/api/device/stream/error", post(report_stream_error))
        .route("/api/device/capture", post(capture_photo))
        .route("/api/device/refresh", post(force_refresh))
        .route("/api/device/probe", post(probe_now))
        // Events
        .route("/api/device/events", get(ws_handler))
        .with_state(state)
}

async fn device_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.supervisor.status()))
}

async fn stream_locator(State(state): State<AppState>) -> impl IntoResponse {
    match state.supervisor.stream_locator() {
        Some(locator) => (StatusCode::OK, Json(ApiResponse::success(locator))),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<StreamLocator>::error("No active stream session")),
        ),
    }
}

async fn report_stream_error(
    State(state): State<AppState>,
    body: Option<Json<StreamErrorReport>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(report)| report.reason)
        .unwrap_or_else(|| "unspecified".to_string());
    state.supervisor.report_stream_error(&reason);
    StatusCode::ACCEPTED
}

async fn capture_photo(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let photo = state.supervisor.capture_photo().await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (header::CONTENT_LOCATION, photo.locator),
        ],
        photo.image,
    ))
}

async fn force_refresh(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.supervisor.force_refresh().map(|h| h.generation());
    Json(ApiResponse::success(RefreshResponse { session }))
}

async fn probe_now(State(state): State<AppState>) -> impl IntoResponse {
    state.supervisor.probe_now();
    StatusCode::ACCEPTED
}

/// WebSocket upgrade for engine events
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Forward engine events to one WebSocket client
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.supervisor.subscribe();
    let conn_id = uuid::Uuid::new_v4();

    tracing::info!(connection_id = %conn_id, "WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(connection_id = %conn_id, skipped = skipped, "WebSocket client lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize engine event");
                    continue;
                }
            };

            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // Whichever side ends first takes the other down with it, releasing the
    // event subscription
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
}
