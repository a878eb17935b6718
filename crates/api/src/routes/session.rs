use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use common::SettlementMode;
use engine::SessionSnapshot;

use crate::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/decisions", get(get_decisions))
        .route("/api/prices", get(get_prices))
}

/// Session overview without the decision and price lists.
pub(crate) fn summary(snapshot: &SessionSnapshot) -> Value {
    let next_action = match snapshot.mode {
        SettlementMode::Binary => snapshot.next_direction.binary_label(),
        SettlementMode::Position => snapshot.next_direction.position_label(),
    };
    json!({
        "state": snapshot.state,
        "mode": snapshot.mode,
        "cadence_value": snapshot.cadence_value,
        "cadence_period_ms": snapshot.cadence_period_ms,
        "next_direction": snapshot.next_direction,
        "next_action": next_action,
        "connected": snapshot.connected,
        "latest_price": snapshot.latest_price,
        "stats": snapshot.stats,
        "portfolio": snapshot.portfolio,
        "decision_count": snapshot.decisions.len(),
    })
}

async fn get_session(State(state): State<AppState>) -> Json<Value> {
    Json(summary(&state.engine.snapshot()))
}

#[derive(Deserialize)]
struct DecisionsQuery {
    limit: Option<usize>,
}

async fn get_decisions(
    State(state): State<AppState>,
    Query(q): Query<DecisionsQuery>,
) -> Json<Value> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let snapshot = state.engine.snapshot();

    // Stored oldest first; served newest first.
    let decisions: Vec<Value> = snapshot
        .decisions
        .iter()
        .rev()
        .take(limit)
        .map(|d| {
            let mut v = json!(d);
            v["outcome_label"] = json!(d.outcome().money_label());
            v
        })
        .collect();

    Json(json!({
        "decisions": decisions,
        "total": snapshot.decisions.len(),
        "limit": limit,
    }))
}

async fn get_prices(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.engine.snapshot();
    Json(json!({
        "prices": snapshot.prices,
        "latest": snapshot.latest_price,
    }))
}
