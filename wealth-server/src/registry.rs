//! Contract Registry
//!
//! Resolves the CipherWealth deployment for a chain id from a deployment
//! table loaded once at startup:
//!
//! ```json
//! {
//!   "31337": { "address": "0x…", "chainId": 31337, "chainName": "hardhat" }
//! }
//! ```
//!
//! A missing entry or a zero address means "not deployed on this chain".
//! That is a normal state, not an error.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{Address, ChainContractInfo, ContractAbi};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read deployment table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid deployment table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One deployment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEntry {
    pub address: Address,
    pub chain_id: u64,
    pub chain_name: String,
}

/// Chain id (as a decimal string) -> deployment
pub type DeploymentTable = BTreeMap<String, DeploymentEntry>;

#[derive(Debug, Clone)]
pub struct ChainRegistry {
    abi: Arc<ContractAbi>,
    entries: DeploymentTable,
}

impl ChainRegistry {
    pub fn new(abi: ContractAbi, entries: DeploymentTable) -> Self {
        Self {
            abi: Arc::new(abi),
            entries,
        }
    }

    /// Load the table from a JSON file; a missing file yields an empty table
    pub fn load(abi: ContractAbi, path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            info!(path = %path.display(), "No deployment table found, starting empty");
            return Ok(Self::new(abi, DeploymentTable::new()));
        }

        let raw = std::fs::read_to_string(path)?;
        let entries: DeploymentTable = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            chains = entries.len(),
            "Loaded deployment table"
        );
        Ok(Self::new(abi, entries))
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn abi(&self) -> &Arc<ContractAbi> {
        &self.abi
    }

    pub fn entries(&self) -> &DeploymentTable {
        &self.entries
    }

    pub fn entry(&self, chain_id: u64) -> Option<&DeploymentEntry> {
        self.entries.get(&chain_id.to_string())
    }

    pub fn upsert(&mut self, entry: DeploymentEntry) {
        self.entries.insert(entry.chain_id.to_string(), entry);
    }

    /// Deployment info for the connected chain
    pub fn resolve(&self, chain_id: Option<u64>) -> ChainContractInfo {
        let Some(chain_id) = chain_id else {
            return ChainContractInfo {
                abi: self.abi.clone(),
                address: None,
                chain_id: None,
                chain_name: None,
            };
        };

        match self.entry(chain_id) {
            Some(entry) if !entry.address.is_zero() => ChainContractInfo {
                abi: self.abi.clone(),
                address: Some(entry.address),
                chain_id: Some(entry.chain_id),
                chain_name: Some(entry.chain_name.clone()),
            },
            _ => {
                debug!(chain_id, "No deployment for chain");
                ChainContractInfo {
                    abi: self.abi.clone(),
                    address: None,
                    chain_id: Some(chain_id),
                    chain_name: None,
                }
            }
        }
    }
}
