//! Health and status endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use crate::state::AppState;
use crate::types::{HealthResponse, StatusResponse};

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
}

/// Health check endpoint
/// GET /health
async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Detailed status endpoint
/// GET /status
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let controller = state.controller();
    let contract = controller.contract_info();
    // protocolId needs a read provider and a deployment; absent otherwise
    let protocol_id = controller.protocol_id().await.ok();

    let response = StatusResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chain_id: contract.chain_id,
        contract: contract.address,
        protocol_id,
        supported_functions: contract
            .abi
            .function_names()
            .into_iter()
            .map(String::from)
            .collect(),
        uptime_secs: state.uptime_secs(),
    };

    (StatusCode::OK, Json(response))
}
