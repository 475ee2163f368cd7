//! Wallet, balance and operation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::services::controller::{BalanceView, ControllerError, Outcome};
use crate::state::AppState;
use crate::types::{
    AccountsResponse, Address, AmountRequest, BalanceOfResponse, ConnectRequest, ErrorCode,
    ErrorResponse, SwitchAccountRequest, SwitchChainRequest, TransferRequest,
};

/// Result of an action plus the state it left behind
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub view: BalanceView,
}

/// Create wallet routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wallet", get(get_wallet))
        .route("/wallet/connect", post(connect))
        .route("/wallet/chain", post(switch_chain))
        .route("/wallet/account", post(switch_account))
        .route("/wallet/disconnect", post(disconnect))
        .route("/balance/refresh", post(refresh_balance))
        .route("/balance/decrypt", post(decrypt_balance))
        .route("/balance/:address", get(balance_of))
        .route("/deposit", post(deposit))
        .route("/withdraw", post(withdraw))
        .route("/transfer", post(transfer))
        .route("/accounts", get(accounts))
}

fn error_response(status: StatusCode, code: ErrorCode, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            code,
            message,
            details: None,
        }),
    )
        .into_response()
}

fn unknown_account(account: Address) -> Response {
    warn!(%account, "Wallet has no such account");
    error_response(
        StatusCode::NOT_FOUND,
        ErrorCode::WalletUnavailable,
        format!("Unknown account {account}"),
    )
}

fn action(state: &AppState, outcome: Outcome) -> Response {
    let response = ActionResponse {
        outcome,
        view: state.controller().view(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Current chain, account, balance, lanes and gates
/// GET /api/v1/wallet
async fn get_wallet(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller().view())
}

/// Connect a dev account on `chainId`
/// POST /api/v1/wallet/connect
#[instrument(skip(state))]
async fn connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Response {
    let Some(providers) = state.providers_for(&request.account) else {
        return unknown_account(request.account);
    };
    state.controller().connect(request.chain_id, providers);
    Json(state.controller().view()).into_response()
}

/// The wallet switched chains; providers are re-attached for the new chain
/// POST /api/v1/wallet/chain
#[instrument(skip(state))]
async fn switch_chain(
    State(state): State<AppState>,
    Json(request): Json<SwitchChainRequest>,
) -> Response {
    let controller = state.controller();
    controller.chain_changed(request.chain_id);

    // the devnet providers only serve their own chain
    let providers = controller
        .view()
        .network
        .account
        .and_then(|account| state.providers_for(&account))
        .filter(|p| p.instance.as_ref().map(|g| g.chain_id()) == Some(request.chain_id));
    if let Some(providers) = providers {
        controller.connect(request.chain_id, providers);
    }
    Json(controller.view()).into_response()
}

/// The wallet switched accounts; the new signer is attached
/// POST /api/v1/wallet/account
#[instrument(skip(state))]
async fn switch_account(
    State(state): State<AppState>,
    Json(request): Json<SwitchAccountRequest>,
) -> Response {
    let Some(providers) = state.providers_for(&request.account) else {
        return unknown_account(request.account);
    };
    let controller = state.controller();
    controller.accounts_changed(request.account);

    if let Some(chain_id) = controller.view().network.chain_id {
        controller.connect(chain_id, providers);
    }
    Json(controller.view()).into_response()
}

/// POST /api/v1/wallet/disconnect
async fn disconnect(State(state): State<AppState>) -> impl IntoResponse {
    state.controller().disconnect();
    Json(state.controller().view())
}

/// POST /api/v1/balance/refresh
async fn refresh_balance(State(state): State<AppState>) -> Response {
    let outcome = state.controller().refresh_balance().await;
    action(&state, outcome)
}

/// POST /api/v1/balance/decrypt
async fn decrypt_balance(State(state): State<AppState>) -> Response {
    let outcome = state.controller().decrypt_balance().await;
    action(&state, outcome)
}

/// Encrypted balance handle of any user
/// GET /api/v1/balance/:address
#[instrument(skip(state))]
async fn balance_of(State(state): State<AppState>, Path(user): Path<Address>) -> Response {
    match state.controller().balance_of(user).await {
        Ok(handle) => Json(BalanceOfResponse { user, handle }).into_response(),
        Err(e) => {
            let (status, code) = match &e {
                ControllerError::NotConnected => {
                    (StatusCode::CONFLICT, ErrorCode::WalletUnavailable)
                }
                ControllerError::NotDeployed(_) => (StatusCode::NOT_FOUND, ErrorCode::NotDeployed),
                ControllerError::Contract(_) | ControllerError::Gateway(_) => {
                    (StatusCode::BAD_GATEWAY, ErrorCode::ContractError)
                }
            };
            warn!(%user, error = %e, "Balance lookup failed");
            error_response(status, code, e.to_string())
        }
    }
}

/// POST /api/v1/deposit
#[instrument(skip(state))]
async fn deposit(State(state): State<AppState>, Json(request): Json<AmountRequest>) -> Response {
    let outcome = state.controller().deposit(request.amount).await;
    info!(?outcome, "Deposit request finished");
    action(&state, outcome)
}

/// POST /api/v1/withdraw
#[instrument(skip(state))]
async fn withdraw(State(state): State<AppState>, Json(request): Json<AmountRequest>) -> Response {
    let outcome = state.controller().withdraw(request.amount).await;
    info!(?outcome, "Withdraw request finished");
    action(&state, outcome)
}

/// POST /api/v1/transfer
#[instrument(skip(state))]
async fn transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Response {
    let outcome = state
        .controller()
        .transfer(request.to, request.amount)
        .await;
    info!(?outcome, "Transfer request finished");
    action(&state, outcome)
}

/// Dev accounts the wallet can connect with
/// GET /api/v1/accounts
async fn accounts(State(state): State<AppState>) -> impl IntoResponse {
    Json(AccountsResponse {
        accounts: state.devnet().accounts(),
    })
}
