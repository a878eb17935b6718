mod advisory;
mod control;
mod health;
mod session;
mod ws;

use axum::{middleware, Router};

use crate::{auth::require_auth, AppState};

pub use health::health_router;
pub use ws::ws_router;

/// Every `/api/*` route, behind bearer auth.
pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(session::router())
        .merge(control::router())
        .merge(advisory::router())
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
