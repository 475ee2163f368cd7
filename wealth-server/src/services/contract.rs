//! CipherWealth contract and wallet seams
//!
//! The encrypted balance contract is consumed through its ABI only:
//!
//! - `deposit(externalEuint64, bytes proof)`
//! - `withdraw(externalEuint64, bytes proof)`
//! - `transfer(address to, externalEuint64, bytes proof)`
//! - `getBalance() -> bytes32`
//! - `getBalanceOf(address) -> bytes32`
//! - `protocolId() -> uint256`
//!
//! Implementations talk to a node (or the in-process devnet); the
//! controller only ever sees these traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    Address, DecryptionAuthorization, EncryptedHandle, EncryptedInput, TxHash, TxReceipt,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// Transaction or call reverted; carries the revert reason
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("no contract deployed at {0}")]
    NotDeployed(Address),
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxHash),
    #[error("provider error: {0}")]
    Provider(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("user rejected the request")]
    Rejected,
    #[error("wallet error: {0}")]
    Other(String),
}

/// ABI surface of the encrypted balance contract
#[async_trait]
pub trait CipherWealthContract: Send + Sync {
    /// `getBalance()` called with `from = caller`
    async fn get_balance(
        &self,
        contract: Address,
        caller: Address,
    ) -> Result<EncryptedHandle, ContractError>;

    async fn get_balance_of(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<EncryptedHandle, ContractError>;

    /// `protocolId()`. The on-chain `uint256` is narrowed to `u64`.
    async fn protocol_id(&self, contract: Address) -> Result<u64, ContractError>;

    async fn deposit(
        &self,
        contract: Address,
        caller: Address,
        amount: &EncryptedInput,
    ) -> Result<TxHash, ContractError>;

    async fn withdraw(
        &self,
        contract: Address,
        caller: Address,
        amount: &EncryptedInput,
    ) -> Result<TxHash, ContractError>;

    async fn transfer(
        &self,
        contract: Address,
        caller: Address,
        to: Address,
        amount: &EncryptedInput,
    ) -> Result<TxHash, ContractError>;

    /// Wait until the transaction is mined. A reverted receipt is an error.
    async fn wait_for_receipt(&self, tx: TxHash) -> Result<TxReceipt, ContractError>;
}

/// Connected wallet account
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign the typed-data authorization for user decryption; returns the
    /// signature as hex
    async fn sign_decryption_authorization(
        &self,
        payload: &DecryptionAuthorization,
    ) -> Result<String, WalletError>;
}
