//! Devnet FHE SDK instance

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signature, SigningKey, Verifier};
use tracing::debug;

use super::{authorization_digest, DevnetInner};
use crate::services::gateway::{FhevmInstance, GatewayError, HandleContractPair, KeyPair};
use crate::types::{
    Address, DecryptionAuthorization, DecryptionSignature, EncryptedHandle, EncryptedInput,
};

pub struct MockFhevm {
    inner: Arc<DevnetInner>,
}

impl MockFhevm {
    pub(crate) fn new(inner: Arc<DevnetInner>) -> Self {
        Self { inner }
    }

    fn verify_signature(&self, signature: &DecryptionSignature) -> Result<(), GatewayError> {
        let user = signature.user_address;
        let verifying_key = self
            .inner
            .verifying_key(&user)
            .ok_or_else(|| GatewayError::Unauthorized(format!("unknown account {user}")))?;

        let raw: [u8; 64] = hex::decode(&signature.signature)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| GatewayError::Unauthorized("malformed signature".into()))?;

        let authorization = DecryptionAuthorization {
            chain_id: self.inner.chain_id,
            public_key: signature.public_key.clone(),
            contract_addresses: signature.contract_addresses.clone(),
            start_timestamp: signature.start_timestamp,
            duration_days: signature.duration_days,
        };
        verifying_key
            .verify(
                &authorization_digest(&authorization),
                &Signature::from_bytes(&raw),
            )
            .map_err(|_| GatewayError::Unauthorized("signature does not match user".into()))?;

        // the gateway re-encrypts for the public key; the private key must match
        let secret: [u8; 32] = hex::decode(&signature.private_key)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| GatewayError::Unauthorized("malformed private key".into()))?;
        let derived = hex::encode(SigningKey::from_bytes(&secret).verifying_key().to_bytes());
        if derived != signature.public_key {
            return Err(GatewayError::Unauthorized("key pair mismatch".into()));
        }

        let now = self.inner.clock.now();
        if now < signature.start_timestamp || !signature.is_valid_at(now) {
            return Err(GatewayError::Unauthorized(format!(
                "signature not valid at {now}"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl FhevmInstance for MockFhevm {
    fn chain_id(&self) -> u64 {
        self.inner.chain_id
    }

    async fn encrypt_input(
        &self,
        contract: Address,
        user: Address,
        values: &[u64],
    ) -> Result<EncryptedInput, GatewayError> {
        if values.is_empty() {
            return Err(GatewayError::EmptyInput);
        }
        let (handles, input_proof) = self.inner.ledger().register_inputs(contract, user, values);
        debug!(%contract, %user, count = handles.len(), "Encrypted input registered");
        Ok(EncryptedInput {
            handles,
            input_proof,
        })
    }

    fn generate_keypair(&self) -> KeyPair {
        let secret: [u8; 32] = rand::random();
        let key = SigningKey::from_bytes(&secret);
        KeyPair {
            public_key: hex::encode(key.verifying_key().to_bytes()),
            private_key: hex::encode(secret),
        }
    }

    async fn user_decrypt(
        &self,
        pairs: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<EncryptedHandle, u64>, GatewayError> {
        self.verify_signature(signature)?;

        let user = signature.user_address;
        let ledger = self.inner.ledger();
        let mut clear = HashMap::with_capacity(pairs.len());

        for pair in pairs {
            if !signature.contract_addresses.contains(&pair.contract_address) {
                return Err(GatewayError::Unauthorized(format!(
                    "signature does not cover contract {}",
                    pair.contract_address
                )));
            }
            let ciphertext = ledger.ciphertext(&pair.handle).ok_or_else(|| {
                GatewayError::Decryption(format!("unknown handle {}", pair.handle))
            })?;
            if !ciphertext.acl.contains(&user) || !ciphertext.acl.contains(&pair.contract_address)
            {
                return Err(GatewayError::Unauthorized(format!(
                    "{user} is not allowed to decrypt {}",
                    pair.handle
                )));
            }
            clear.insert(pair.handle, ciphertext.value);
        }

        Ok(clear)
    }
}
