//! Encryption Gateway Adapter
//!
//! Wraps an FHE SDK instance: builds encrypted inputs (amount -> ciphertext
//! handle + validity proof) and performs authenticated user decryption of
//! handles returned by the contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::types::{
    Address, DecryptionAuthorization, DecryptionSignature, EncryptedHandle, EncryptedInput,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Encryption failed: {0}")]
    Encryption(String),
    #[error("Encrypted input produced no handles")]
    EmptyInput,
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error("Not authorized to decrypt: {0}")]
    Unauthorized(String),
    #[error("Decryption result missing handle {0}")]
    MissingHandle(EncryptedHandle),
}

/// Ephemeral key pair used as re-encryption target for user decryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: EncryptedHandle,
    pub contract_address: Address,
}

/// FHE SDK instance bound to one chain
#[async_trait]
pub trait FhevmInstance: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Encrypt 64-bit values for `contract`, bound to `user`
    async fn encrypt_input(
        &self,
        contract: Address,
        user: Address,
        values: &[u64],
    ) -> Result<EncryptedInput, GatewayError>;

    fn generate_keypair(&self) -> KeyPair;

    fn create_decryption_authorization(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: i64,
        duration_days: u32,
    ) -> DecryptionAuthorization {
        DecryptionAuthorization {
            chain_id: self.chain_id(),
            public_key: public_key.to_string(),
            contract_addresses: contract_addresses.to_vec(),
            start_timestamp,
            duration_days,
        }
    }

    /// Decrypt handles the signature's user is allowed to read
    async fn user_decrypt(
        &self,
        pairs: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<EncryptedHandle, u64>, GatewayError>;
}

/// Adapter the controller talks to
#[derive(Clone)]
pub struct EncryptionGateway {
    instance: Arc<dyn FhevmInstance>,
}

impl EncryptionGateway {
    pub fn new(instance: Arc<dyn FhevmInstance>) -> Self {
        Self { instance }
    }

    pub fn instance(&self) -> &dyn FhevmInstance {
        self.instance.as_ref()
    }

    pub fn chain_id(&self) -> u64 {
        self.instance.chain_id()
    }

    pub fn create_encrypted_input(&self, contract: Address, user: Address) -> InputBuilder<'_> {
        InputBuilder {
            gateway: self,
            contract,
            user,
            values: Vec::new(),
        }
    }

    /// Encrypt a single amount; returns its handle and the input proof
    pub async fn encrypt_amount(
        &self,
        contract: Address,
        user: Address,
        amount: u64,
    ) -> Result<EncryptedInput, GatewayError> {
        self.create_encrypted_input(contract, user)
            .add64(amount)
            .encrypt()
            .await
    }

    /// Decrypt one handle of `contract` with a user decryption signature
    #[instrument(skip(self, signature), fields(user = %signature.user_address))]
    pub async fn decrypt(
        &self,
        handle: EncryptedHandle,
        contract: Address,
        signature: &DecryptionSignature,
    ) -> Result<u64, GatewayError> {
        let pairs = [HandleContractPair {
            handle,
            contract_address: contract,
        }];
        let clear = self.instance.user_decrypt(&pairs, signature).await?;
        let value = clear
            .get(&handle)
            .copied()
            .ok_or(GatewayError::MissingHandle(handle))?;
        debug!(%handle, "Handle decrypted");
        Ok(value)
    }
}

/// Fluent encrypted-input builder
pub struct InputBuilder<'a> {
    gateway: &'a EncryptionGateway,
    contract: Address,
    user: Address,
    values: Vec<u64>,
}

impl InputBuilder<'_> {
    pub fn add64(mut self, value: u64) -> Self {
        self.values.push(value);
        self
    }

    pub async fn encrypt(self) -> Result<EncryptedInput, GatewayError> {
        let input = self
            .gateway
            .instance
            .encrypt_input(self.contract, self.user, &self.values)
            .await?;
        if input.handles.len() < self.values.len() || input.handles.is_empty() {
            return Err(GatewayError::EmptyInput);
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Instance that "encrypts" by echoing values into handles and decrypts
    /// nothing but a fixed table
    struct EchoInstance {
        known: HashMap<EncryptedHandle, u64>,
    }

    #[async_trait]
    impl FhevmInstance for EchoInstance {
        fn chain_id(&self) -> u64 {
            7
        }

        async fn encrypt_input(
            &self,
            _contract: Address,
            _user: Address,
            values: &[u64],
        ) -> Result<EncryptedInput, GatewayError> {
            let handles = values
                .iter()
                .map(|v| {
                    let mut bytes = [0u8; 32];
                    bytes[24..].copy_from_slice(&v.to_be_bytes());
                    EncryptedHandle(bytes)
                })
                .collect();
            Ok(EncryptedInput {
                handles,
                input_proof: vec![0xaa],
            })
        }

        fn generate_keypair(&self) -> KeyPair {
            KeyPair {
                public_key: "pk".into(),
                private_key: "sk".into(),
            }
        }

        async fn user_decrypt(
            &self,
            _pairs: &[HandleContractPair],
            _signature: &DecryptionSignature,
        ) -> Result<HashMap<EncryptedHandle, u64>, GatewayError> {
            Ok(self.known.clone())
        }
    }

    fn signature() -> DecryptionSignature {
        DecryptionSignature {
            private_key: "sk".into(),
            public_key: "pk".into(),
            signature: "00".into(),
            contract_addresses: vec![Address([1; 20])],
            user_address: Address([2; 20]),
            start_timestamp: 0,
            duration_days: 1,
        }
    }

    #[tokio::test]
    async fn test_encrypt_amount_yields_single_handle() {
        let gateway = EncryptionGateway::new(Arc::new(EchoInstance {
            known: HashMap::new(),
        }));

        let input = gateway
            .encrypt_amount(Address([1; 20]), Address([2; 20]), 500)
            .await
            .unwrap();
        assert_eq!(input.handles.len(), 1);
        assert_eq!(&input.handles[0].0[24..], &500u64.to_be_bytes());
        assert_eq!(input.input_proof, vec![0xaa]);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let gateway = EncryptionGateway::new(Arc::new(EchoInstance {
            known: HashMap::new(),
        }));

        let result = gateway
            .create_encrypted_input(Address([1; 20]), Address([2; 20]))
            .encrypt()
            .await;
        assert_eq!(result.unwrap_err(), GatewayError::EmptyInput);
    }

    #[tokio::test]
    async fn test_decrypt_missing_handle() {
        let present = EncryptedHandle([5; 32]);
        let absent = EncryptedHandle([6; 32]);
        let gateway = EncryptionGateway::new(Arc::new(EchoInstance {
            known: HashMap::from([(present, 42)]),
        }));

        let value = gateway
            .decrypt(present, Address([1; 20]), &signature())
            .await
            .unwrap();
        assert_eq!(value, 42);

        let err = gateway
            .decrypt(absent, Address([1; 20]), &signature())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::MissingHandle(absent));
    }

    #[test]
    fn test_authorization_carries_chain_id() {
        let instance = EchoInstance {
            known: HashMap::new(),
        };
        let auth = instance.create_decryption_authorization("pk", &[Address([1; 20])], 10, 365);
        assert_eq!(auth.chain_id, 7);
        assert_eq!(auth.duration_days, 365);
    }
}
