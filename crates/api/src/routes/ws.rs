use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use common::EngineEvent;

use crate::{routes::session::summary, AppState};

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/events", get(ws_events_handler))
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Streams engine events as JSON text frames.
/// Auth via query param `?token=<DASHBOARD_TOKEN>` (browsers can't set
/// custom WS headers).
async fn ws_events_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
) -> Response {
    let authed = q
        .token
        .as_deref()
        .map(|t| t == state.dashboard_token)
        .unwrap_or(false);

    if !authed {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    // Subscribe before the upgrade so nothing published in between is lost.
    let events = state.engine.subscribe_events();
    let greeting = json!({
        "event": "snapshot",
        "session": summary(&state.engine.snapshot()),
    })
    .to_string();
    ws.on_upgrade(move |socket| handle_ws(socket, greeting, events))
}

async fn handle_ws(
    mut socket: WebSocket,
    greeting: String,
    mut events: broadcast::Receiver<EngineEvent>,
) {
    if socket.send(Message::Text(greeting)).await.is_err() {
        return;
    }

    loop {
        match events.recv().await {
            Ok(event) => {
                let text = match serde_json::to_string(&event) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode engine event");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    debug!("Event client went away");
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!(dropped = n, "WebSocket event client lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
