//! # CipherWealth - Wallet Gateway
//!
//! Encrypted balance gateway for the CipherWealth FHE contract.
//!
//! ## Features
//!
//! - Encrypted deposits, withdrawals and transfers of `euint64` balances
//! - User decryption with cached, time-bounded decryption signatures
//! - Readiness gates that close on chain or account changes
//! - In-process devnet with deterministic dev accounts and deployments
//!
//! ## Usage
//!
//! ```bash
//! # Write deployments/addresses.json
//! cargo run --bin wealth-deploy
//!
//! # Start the gateway
//! cargo run --bin wealth-server
//!
//! # Persist decryption signatures between restarts
//! WEALTH_SIGNATURE_STORE_PATH=signatures.json cargo run --bin wealth-server
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Chain, contract and protocol id
//! - `GET /api/v1/wallet` - Balance view with lanes and gates
//! - `POST /api/v1/wallet/{connect,chain,account,disconnect}` - Wallet events
//! - `POST /api/v1/balance/{refresh,decrypt}` - Fetch or decrypt the balance
//! - `POST /api/v1/{deposit,withdraw,transfer}` - Encrypted operations

use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wealth_server::clock::SystemClock;
use wealth_server::config::Config;
use wealth_server::deploy::deploy_cipher_wealth;
use wealth_server::devnet::Devnet;
use wealth_server::registry::ChainRegistry;
use wealth_server::routes::create_routes;
use wealth_server::services::signature::{
    DecryptionSignatureCache, InMemoryStorage, JsonFileStorage, StringStorage,
};
use wealth_server::services::BalanceController;
use wealth_server::state::AppState;
use wealth_server::types::ContractAbi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        chain_id = config.devnet_chain_id,
        registry = %config.registry_path.display(),
        "Starting CipherWealth wallet gateway"
    );

    // Start the devnet and make sure the contract is deployed on it
    let clock = Arc::new(SystemClock);
    let devnet = Devnet::new(&config.devnet(), clock.clone());

    let abi = ContractAbi::cipher_wealth().context("Bundled ABI is invalid")?;
    let mut registry = ChainRegistry::load(abi, &config.registry_path)?;
    let deployment = deploy_cipher_wealth(&devnet, &mut registry)?;
    if let Err(e) = registry.save(&config.registry_path) {
        warn!(error = %e, "Could not write deployment table");
    }
    info!(
        chain_id = deployment.chain_id,
        address = %deployment.address,
        accounts = devnet.accounts().len(),
        "Devnet ready"
    );

    // Decryption signature storage
    let storage: Arc<dyn StringStorage> = match &config.signature_store_path {
        Some(path) => {
            info!(path = %path.display(), "Persisting decryption signatures");
            Arc::new(JsonFileStorage::open(path).await?)
        }
        None => Arc::new(InMemoryStorage::new()),
    };
    let signatures = Arc::new(DecryptionSignatureCache::new(
        storage,
        clock,
        config.signature_duration_days,
    ));

    // Create application state
    let controller = Arc::new(BalanceController::new(
        Arc::new(registry),
        signatures,
        config.refresh_delay(),
    ));
    let state = AppState::new(controller, devnet);

    // Build router
    let app = create_routes(state)
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.socket_addr().context("Invalid host/port")?;
    info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build CORS layer from the configured origins
fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if config.cors_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Initialize logging based on configuration
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    }
}
