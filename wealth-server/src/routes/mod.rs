//! HTTP Routes for the wealth server
//!
//! The presentation layer: a JSON view of the controller plus one endpoint
//! per user action.

pub mod health;
pub mod wallet;

use axum::Router;

use crate::state::AppState;

/// Create all routes
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .nest("/api/v1", wallet::routes())
        .with_state(state)
}
