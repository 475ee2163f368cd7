//! In-process development chain
//!
//! A local stand-in for a node running the FHE coprocessor, equivalent to
//! the mock environment the contract test-suite runs against:
//!
//! - deterministic dev accounts derived from a seed (Ed25519 wallet keys)
//! - deterministic contract addresses, so a deployment table written by
//!   `wealth-deploy` matches a freshly started server
//! - the CipherWealth contract semantics over simulated ciphertexts with
//!   access-control lists
//! - user decryption that verifies the wallet signature, the ephemeral key
//!   pair, the validity window and the ACL
//!
//! Nothing here is private: clear values sit next to their handles.

pub mod contract;
pub mod fhe;
mod ledger;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::clock::Clock;
use crate::services::contract::{ContractError, WalletError, WalletSigner};
use crate::services::controller::Providers;
use crate::services::gateway::EncryptionGateway;
use crate::types::{Address, ContractEvent, DecryptionAuthorization};

pub use contract::DevnetContract;
pub use fhe::MockFhevm;
use ledger::Ledger;

/// Value returned by `protocolId()` on the devnet
pub const DEVNET_PROTOCOL_ID: u64 = 10001;

#[derive(Debug, Clone)]
pub struct DevnetConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub accounts: usize,
    pub seed: String,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            chain_name: "hardhat".to_string(),
            accounts: 3,
            seed: "cipher-wealth-devnet".to_string(),
        }
    }
}

struct DevAccount {
    address: Address,
    signing_key: SigningKey,
}

pub(crate) struct DevnetInner {
    chain_id: u64,
    chain_name: String,
    clock: Arc<dyn Clock>,
    accounts: Vec<DevAccount>,
    ledger: Mutex<Ledger>,
}

impl DevnetInner {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn verifying_key(&self, address: &Address) -> Option<VerifyingKey> {
        self.accounts
            .iter()
            .find(|account| account.address == *address)
            .map(|account| account.signing_key.verifying_key())
    }
}

/// Handle to a running devnet; cheap to clone
#[derive(Clone)]
pub struct Devnet {
    inner: Arc<DevnetInner>,
}

impl Devnet {
    pub fn new(config: &DevnetConfig, clock: Arc<dyn Clock>) -> Self {
        let accounts = (0..config.accounts)
            .map(|index| {
                let mut hasher = Sha256::new();
                hasher.update(b"devnet:account");
                hasher.update(config.seed.as_bytes());
                hasher.update((index as u64).to_be_bytes());
                let secret: [u8; 32] = hasher.finalize().into();
                let signing_key = SigningKey::from_bytes(&secret);
                DevAccount {
                    address: address_of(&signing_key.verifying_key()),
                    signing_key,
                }
            })
            .collect();

        Self {
            inner: Arc::new(DevnetInner {
                chain_id: config.chain_id,
                chain_name: config.chain_name.clone(),
                clock,
                accounts,
                ledger: Mutex::new(Ledger::new(config.chain_id)),
            }),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.inner.chain_id
    }

    pub fn chain_name(&self) -> &str {
        &self.inner.chain_name
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.inner.accounts.iter().map(|a| a.address).collect()
    }

    /// Deploy a fresh CipherWealth contract from a dev account
    pub fn deploy(&self, deployer: Address) -> Result<Address, ContractError> {
        if self.inner.verifying_key(&deployer).is_none() {
            return Err(ContractError::Provider(format!(
                "unknown devnet account {deployer}"
            )));
        }
        let address = self.inner.ledger().create_contract(deployer);
        info!(%deployer, %address, chain_id = self.inner.chain_id, "Devnet contract deployed");
        Ok(address)
    }

    pub fn is_deployed(&self, contract: &Address) -> bool {
        self.inner.ledger().contracts.contains_key(contract)
    }

    /// Events emitted so far by `contract`, oldest first
    pub fn events(&self, contract: &Address) -> Vec<ContractEvent> {
        self.inner
            .ledger()
            .contracts
            .get(contract)
            .map(|storage| storage.events.clone())
            .unwrap_or_default()
    }

    pub fn instance(&self) -> Arc<MockFhevm> {
        Arc::new(MockFhevm::new(self.inner.clone()))
    }

    pub fn contract(&self) -> Arc<DevnetContract> {
        Arc::new(DevnetContract::new(self.inner.clone()))
    }

    pub fn signer(&self, account: &Address) -> Option<Arc<DevSigner>> {
        self.inner
            .accounts
            .iter()
            .find(|a| a.address == *account)
            .map(|a| Arc::new(DevSigner::new(a.signing_key.clone())))
    }

    /// Full wallet connection for `signer`: FHE instance, read and write
    /// providers
    pub fn providers(&self, signer: Arc<DevSigner>) -> Providers {
        let contract = self.contract();
        Providers {
            instance: Some(EncryptionGateway::new(self.instance())),
            read_provider: Some(contract.clone()),
            write_provider: Some(contract),
            signer: Some(signer),
        }
    }

    pub fn providers_for(&self, account: &Address) -> Option<Providers> {
        self.signer(account).map(|signer| self.providers(signer))
    }
}

/// Address of a wallet key: last 20 bytes of SHA-256 over the public key
pub fn address_of(key: &VerifyingKey) -> Address {
    let digest: [u8; 32] = Sha256::digest(key.as_bytes()).into();
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Address(address)
}

/// Digest the wallet signs to authorize user decryption
pub fn authorization_digest(authorization: &DecryptionAuthorization) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"devnet:user-decrypt:v1");
    hasher.update(serde_json::to_vec(authorization).unwrap_or_default());
    hasher.finalize().into()
}

/// Dev account wallet. Counts signing prompts and can be told to refuse.
pub struct DevSigner {
    address: Address,
    signing_key: SigningKey,
    prompts: AtomicUsize,
    reject: AtomicBool,
}

impl DevSigner {
    fn new(signing_key: SigningKey) -> Self {
        Self {
            address: address_of(&signing_key.verifying_key()),
            signing_key,
            prompts: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
        }
    }

    /// Number of signature requests shown to the user so far
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletSigner for DevSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_decryption_authorization(
        &self,
        payload: &DecryptionAuthorization,
    ) -> Result<String, WalletError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(WalletError::Rejected);
        }
        let signature = self.signing_key.sign(&authorization_digest(payload));
        Ok(hex::encode(signature.to_bytes()))
    }
}
