//! Deployment harness
//!
//! Deploys CipherWealth from the first dev account and records it in the
//! chain registry under its chain id. Re-running against a chain where the
//! recorded contract is still live changes nothing.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::devnet::Devnet;
use crate::registry::{ChainRegistry, DeploymentEntry, RegistryError};
use crate::services::contract::ContractError;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("No deployer account available")]
    NoDeployer,
    #[error("Deployment failed: {0}")]
    Contract(#[from] ContractError),
    #[error("Failed to write deployment table: {0}")]
    Registry(#[from] RegistryError),
}

/// Deploy (or find) the contract and upsert its registry entry
pub fn deploy_cipher_wealth(
    devnet: &Devnet,
    registry: &mut ChainRegistry,
) -> Result<DeploymentEntry, DeployError> {
    let chain_id = devnet.chain_id();

    if let Some(existing) = registry.entry(chain_id) {
        if devnet.is_deployed(&existing.address) {
            info!(
                chain_id,
                address = %existing.address,
                "CipherWealth already deployed, reusing"
            );
            return Ok(existing.clone());
        }
    }

    let deployer = devnet
        .accounts()
        .first()
        .copied()
        .ok_or(DeployError::NoDeployer)?;
    let address = devnet.deploy(deployer)?;
    info!("CipherWealth contract: {address}");

    let entry = DeploymentEntry {
        address,
        chain_id,
        chain_name: devnet.chain_name().to_string(),
    };
    registry.upsert(entry.clone());
    Ok(entry)
}

/// Deploy and persist the updated table to `path`
pub fn deploy_and_save(
    devnet: &Devnet,
    registry: &mut ChainRegistry,
    path: &Path,
) -> Result<DeploymentEntry, DeployError> {
    let entry = deploy_cipher_wealth(devnet, registry)?;
    registry.save(path)?;
    info!(path = %path.display(), chain_id = entry.chain_id, "Deployment table updated");
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::devnet::DevnetConfig;
    use crate::registry::DeploymentTable;
    use crate::types::{Address, ContractAbi};
    use std::sync::Arc;

    fn devnet(accounts: usize) -> Devnet {
        Devnet::new(
            &DevnetConfig {
                accounts,
                ..Default::default()
            },
            Arc::new(ManualClock::new(0)),
        )
    }

    fn empty_registry() -> ChainRegistry {
        ChainRegistry::new(ContractAbi::cipher_wealth().unwrap(), DeploymentTable::new())
    }

    #[test]
    fn test_deploy_is_idempotent_while_contract_is_live() {
        let devnet = devnet(3);
        let mut registry = empty_registry();

        let first = deploy_cipher_wealth(&devnet, &mut registry).unwrap();
        let second = deploy_cipher_wealth(&devnet, &mut registry).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.chain_id, 31337);
        assert_eq!(first.chain_name, "hardhat");
        assert_eq!(registry.entry(31337), Some(&first));
        assert!(registry.resolve(Some(31337)).is_deployed());
    }

    #[test]
    fn test_stale_entry_is_replaced() {
        let devnet = devnet(3);
        let mut registry = empty_registry();
        registry.upsert(DeploymentEntry {
            address: Address([0x99; 20]),
            chain_id: 31337,
            chain_name: "hardhat".into(),
        });

        let entry = deploy_cipher_wealth(&devnet, &mut registry).unwrap();
        assert_ne!(entry.address, Address([0x99; 20]));
        assert!(devnet.is_deployed(&entry.address));
    }

    #[test]
    fn test_no_accounts() {
        let devnet = devnet(0);
        let mut registry = empty_registry();
        assert!(matches!(
            deploy_cipher_wealth(&devnet, &mut registry),
            Err(DeployError::NoDeployer)
        ));
    }

    #[test]
    fn test_deploy_and_save_writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments").join("addresses.json");
        let devnet = devnet(1);
        let mut registry = empty_registry();

        let entry = deploy_and_save(&devnet, &mut registry, &path).unwrap();

        let reloaded = ChainRegistry::load(ContractAbi::cipher_wealth().unwrap(), &path).unwrap();
        assert_eq!(reloaded.entry(31337), Some(&entry));
    }
}
