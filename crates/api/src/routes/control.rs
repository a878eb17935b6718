use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use common::{EngineCommand, EngineState, SessionConfig};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/control/start", post(start))
        .route("/api/control/stop", post(stop))
        .route("/api/control/reset", post(reset))
        .route("/api/control/cadence", post(set_cadence))
}

async fn dispatch(state: &AppState, cmd: EngineCommand, name: &str) -> Json<Value> {
    info!(command = name, "Control command via API");
    state.engine.send(cmd).await;
    Json(json!({ "status": "accepted", "command": name }))
}

async fn start(State(state): State<AppState>) -> Json<Value> {
    dispatch(&state, EngineCommand::Start, "start").await
}

async fn stop(State(state): State<AppState>) -> Json<Value> {
    dispatch(&state, EngineCommand::Stop, "stop").await
}

async fn reset(State(state): State<AppState>) -> Json<Value> {
    dispatch(&state, EngineCommand::Reset, "reset").await
}

#[derive(Deserialize)]
struct CadenceBody {
    value: u64,
}

/// Cadence can only change while the engine is stopped.
async fn set_cadence(
    State(state): State<AppState>,
    Json(body): Json<CadenceBody>,
) -> (StatusCode, Json<Value>) {
    if let Err(e) = SessionConfig::check_cadence(body.value) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        );
    }
    if state.engine.state().await == EngineState::Running {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "stop the engine before changing cadence" })),
        );
    }
    let Json(v) = dispatch(&state, EngineCommand::SetCadence(body.value), "cadence").await;
    (StatusCode::OK, Json(v))
}
