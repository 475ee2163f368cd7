//! Deploys CipherWealth to the configured devnet and writes the chain
//! registry table read by `wealth-server`.
//!
//! ```bash
//! cargo run --bin wealth-deploy
//! WEALTH_REGISTRY_PATH=/tmp/addresses.json cargo run --bin wealth-deploy
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wealth_server::clock::SystemClock;
use wealth_server::config::Config;
use wealth_server::deploy::deploy_and_save;
use wealth_server::devnet::Devnet;
use wealth_server::registry::ChainRegistry;
use wealth_server::types::ContractAbi;

fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let devnet = Devnet::new(&config.devnet(), Arc::new(SystemClock));
    let abi = ContractAbi::cipher_wealth().context("Bundled ABI is invalid")?;
    let mut registry = ChainRegistry::load(abi, &config.registry_path)?;

    let entry = deploy_and_save(&devnet, &mut registry, &config.registry_path)?;

    info!(
        chain_id = entry.chain_id,
        chain_name = %entry.chain_name,
        address = %entry.address,
        path = %config.registry_path.display(),
        "Deployment recorded"
    );
    for (index, account) in devnet.accounts().iter().enumerate() {
        info!(index, %account, "Dev account");
    }

    Ok(())
}
