use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde_json::{json, Value};

use common::MarketAnalysis;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/advisory", get(get_advisory))
        .route("/api/advisory/refresh", post(refresh_advisory))
}

async fn get_advisory(State(state): State<AppState>) -> Json<Value> {
    match state.advisory.latest().await {
        Some(report) => Json(json!(report)),
        None => Json(json!({
            "analysis": MarketAnalysis::neutral("No analysis yet."),
            "updated_at": null,
            "points": 0,
        })),
    }
}

async fn refresh_advisory(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.advisory.refresh().await {
        Some(report) => (StatusCode::OK, Json(json!(report))),
        None => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "not enough price data" })),
        ),
    }
}
