//! Decryption Signature Cache
//!
//! Obtains or reuses the time-bounded signature that authorizes a user to
//! decrypt handles of a set of contracts. Signatures are persisted in a
//! string store keyed by (user, sorted contract set) and reused until they
//! expire, so the wallet is prompted once per validity window instead of on
//! every decrypt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::services::contract::WalletSigner;
use crate::services::gateway::FhevmInstance;
use crate::types::{Address, DecryptionSignature};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage content is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed string storage for persisted signatures
#[async_trait]
pub trait StringStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl StringStorage for InMemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.items.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

/// Storage persisted as one JSON object on disk; rewritten on every change
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
}

impl JsonFileStorage {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let items = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    async fn flush(&self, items: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(items)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl StringStorage for JsonFileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut items = self.items.lock().await;
        items.insert(key.to_string(), value);
        self.flush(&items).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().await;
        if items.remove(key).is_some() {
            self.flush(&items).await?;
        }
        Ok(())
    }
}

pub struct DecryptionSignatureCache {
    storage: Arc<dyn StringStorage>,
    clock: Arc<dyn Clock>,
    duration_days: u32,
    /// One lock per storage key, held across the whole load-sign-store
    /// sequence so rapid repeated calls produce a single wallet prompt
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DecryptionSignatureCache {
    pub fn new(storage: Arc<dyn StringStorage>, clock: Arc<dyn Clock>, duration_days: u32) -> Self {
        Self {
            storage,
            clock,
            duration_days,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }

    /// Storage key for (user, contract set); order of `contracts` is irrelevant
    pub fn storage_key(user: &Address, contracts: &[Address]) -> String {
        let sorted = sorted_contracts(contracts);
        let mut hasher = Sha256::new();
        hasher.update(b"cipher-wealth:decryption-signature:v1");
        for contract in &sorted {
            hasher.update(contract.as_bytes());
        }
        let digest: [u8; 32] = hasher.finalize().into();
        format!("{}:{}", user, hex::encode(digest))
    }

    /// A persisted, unexpired signature for (user, contracts), if any
    pub async fn load(&self, user: &Address, contracts: &[Address]) -> Option<DecryptionSignature> {
        let key = Self::storage_key(user, contracts);
        self.load_by_key(&key, user, contracts).await
    }

    async fn load_by_key(
        &self,
        key: &str,
        user: &Address,
        contracts: &[Address],
    ) -> Option<DecryptionSignature> {
        let raw = match self.storage.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read decryption signature store");
                return None;
            }
        };

        let signature: DecryptionSignature = match serde_json::from_str(&raw) {
            Ok(sig) => sig,
            Err(e) => {
                warn!(error = %e, key, "Discarding unreadable decryption signature");
                return None;
            }
        };

        if !signature.covers(user, contracts) {
            debug!(key, "Stored signature issued for a different user or contract set");
            return None;
        }

        let now = self.clock.now();
        if !signature.is_valid_at(now) {
            info!(
                user = %user,
                expired_at = ?signature.expires_at(),
                now,
                "Decryption signature expired"
            );
            return None;
        }

        Some(signature)
    }

    /// Reuse a valid signature or prompt the signer for a new one.
    ///
    /// Returns `None` when the signer refuses or fails; callers must treat
    /// that as "cannot decrypt".
    pub async fn load_or_sign(
        &self,
        instance: &dyn FhevmInstance,
        contracts: &[Address],
        signer: &dyn WalletSigner,
    ) -> Option<DecryptionSignature> {
        let user = signer.address();
        let contracts = sorted_contracts(contracts);
        let key = Self::storage_key(&user, &contracts);

        let key_lock = {
            let mut locks = self.key_locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        let signature = {
            let _guard = key_lock.lock().await;
            self.load_or_sign_locked(instance, &key, user, contracts, signer)
                .await
        };
        self.release_key_lock(&key, key_lock).await;
        signature
    }

    /// Drop the per-key lock once no other caller holds or waits on it
    async fn release_key_lock(&self, key: &str, key_lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        // one reference in the map, one here
        if Arc::strong_count(&key_lock) == 2 {
            locks.remove(key);
        }
    }

    async fn load_or_sign_locked(
        &self,
        instance: &dyn FhevmInstance,
        key: &str,
        user: Address,
        contracts: Vec<Address>,
        signer: &dyn WalletSigner,
    ) -> Option<DecryptionSignature> {
        if let Some(signature) = self.load_by_key(key, &user, &contracts).await {
            debug!(user = %user, "Reusing cached decryption signature");
            return Some(signature);
        }

        let keypair = instance.generate_keypair();
        let start_timestamp = self.clock.now();
        let authorization = instance.create_decryption_authorization(
            &keypair.public_key,
            &contracts,
            start_timestamp,
            self.duration_days,
        );

        let signed = match signer.sign_decryption_authorization(&authorization).await {
            Ok(signed) => signed,
            Err(e) => {
                warn!(user = %user, error = %e, "Decryption authorization was not signed");
                return None;
            }
        };

        let signature = DecryptionSignature {
            private_key: keypair.private_key,
            public_key: keypair.public_key,
            signature: signed,
            contract_addresses: contracts,
            user_address: user,
            start_timestamp,
            duration_days: self.duration_days,
        };

        match serde_json::to_string(&signature) {
            Ok(json) => {
                if let Err(e) = self.storage.set_item(key, json).await {
                    warn!(error = %e, "Failed to persist decryption signature");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize decryption signature"),
        }

        info!(
            user = %user,
            expires_at = ?signature.expires_at(),
            "New decryption signature created"
        );
        Some(signature)
    }
}

fn sorted_contracts(contracts: &[Address]) -> Vec<Address> {
    let mut sorted = contracts.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}
