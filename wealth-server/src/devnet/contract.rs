//! CipherWealth contract semantics on the devnet
//!
//! Balances are `euint64` handles per user. Every new balance ciphertext is
//! readable by the contract and by its owner only. Withdrawals and
//! transfers never underflow: an amount larger than the balance moves
//! nothing, without revealing that it happened.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{DevnetInner, DEVNET_PROTOCOL_ID};
use crate::services::contract::{CipherWealthContract, ContractError};
use crate::types::{Address, ContractEvent, EncryptedHandle, EncryptedInput, TxHash, TxReceipt};

pub struct DevnetContract {
    inner: Arc<DevnetInner>,
}

impl DevnetContract {
    pub(crate) fn new(inner: Arc<DevnetInner>) -> Self {
        Self { inner }
    }

    fn first_handle(amount: &EncryptedInput) -> Result<EncryptedHandle, ContractError> {
        amount
            .handles
            .first()
            .copied()
            .ok_or_else(|| ContractError::Reverted("Missing encrypted amount".into()))
    }
}

fn invalid_proof() -> ContractError {
    ContractError::Reverted("Invalid input proof".into())
}

#[async_trait]
impl CipherWealthContract for DevnetContract {
    async fn get_balance(
        &self,
        contract: Address,
        caller: Address,
    ) -> Result<EncryptedHandle, ContractError> {
        self.get_balance_of(contract, caller).await
    }

    async fn get_balance_of(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<EncryptedHandle, ContractError> {
        let ledger = self.inner.ledger();
        let storage = ledger
            .contracts
            .get(&contract)
            .ok_or(ContractError::NotDeployed(contract))?;
        Ok(storage
            .balances
            .get(&user)
            .copied()
            .unwrap_or(EncryptedHandle::ZERO))
    }

    async fn protocol_id(&self, contract: Address) -> Result<u64, ContractError> {
        if !self.inner.ledger().contracts.contains_key(&contract) {
            return Err(ContractError::NotDeployed(contract));
        }
        Ok(DEVNET_PROTOCOL_ID)
    }

    async fn deposit(
        &self,
        contract: Address,
        caller: Address,
        amount: &EncryptedInput,
    ) -> Result<TxHash, ContractError> {
        let external = Self::first_handle(amount)?;
        let mut ledger = self.inner.ledger();
        let current = ledger
            .contracts
            .get(&contract)
            .ok_or(ContractError::NotDeployed(contract))?
            .balances
            .get(&caller)
            .copied()
            .unwrap_or(EncryptedHandle::ZERO);

        let value = ledger
            .from_external(external, &amount.input_proof, contract, caller)
            .ok_or_else(invalid_proof)?;

        let updated = ledger.add(&current, &value, contract);
        ledger.allow(&updated, caller);

        let event = ContractEvent::Deposit { user: caller };
        if let Some(storage) = ledger.contracts.get_mut(&contract) {
            storage.balances.insert(caller, updated);
            storage.events.push(event.clone());
        }
        let receipt = ledger.mine(vec![event]);
        info!(%contract, user = %caller, tx = %receipt.hash, "Deposit mined");
        Ok(receipt.hash)
    }

    async fn withdraw(
        &self,
        contract: Address,
        caller: Address,
        amount: &EncryptedInput,
    ) -> Result<TxHash, ContractError> {
        let external = Self::first_handle(amount)?;
        let mut ledger = self.inner.ledger();
        let current = ledger
            .contracts
            .get(&contract)
            .ok_or(ContractError::NotDeployed(contract))?
            .balances
            .get(&caller)
            .copied()
            .unwrap_or(EncryptedHandle::ZERO);

        let value = ledger
            .from_external(external, &amount.input_proof, contract, caller)
            .ok_or_else(invalid_proof)?;

        let (remaining, _) = ledger.checked_sub(&current, &value, contract);
        ledger.allow(&remaining, caller);

        let event = ContractEvent::Withdrawal { user: caller };
        if let Some(storage) = ledger.contracts.get_mut(&contract) {
            storage.balances.insert(caller, remaining);
            storage.events.push(event.clone());
        }
        let receipt = ledger.mine(vec![event]);
        info!(%contract, user = %caller, tx = %receipt.hash, "Withdrawal mined");
        Ok(receipt.hash)
    }

    async fn transfer(
        &self,
        contract: Address,
        caller: Address,
        to: Address,
        amount: &EncryptedInput,
    ) -> Result<TxHash, ContractError> {
        if to.is_zero() {
            return Err(ContractError::Reverted(
                "Cannot transfer to zero address".into(),
            ));
        }
        if to == caller {
            return Err(ContractError::Reverted("Cannot transfer to yourself".into()));
        }

        let external = Self::first_handle(amount)?;
        let mut ledger = self.inner.ledger();
        let storage = ledger
            .contracts
            .get(&contract)
            .ok_or(ContractError::NotDeployed(contract))?;
        let sender_balance = storage
            .balances
            .get(&caller)
            .copied()
            .unwrap_or(EncryptedHandle::ZERO);
        let receiver_balance = storage
            .balances
            .get(&to)
            .copied()
            .unwrap_or(EncryptedHandle::ZERO);

        let value = ledger
            .from_external(external, &amount.input_proof, contract, caller)
            .ok_or_else(invalid_proof)?;

        let (sender_updated, moved) = ledger.checked_sub(&sender_balance, &value, contract);
        let receiver_updated = ledger.add(&receiver_balance, &moved, contract);
        ledger.allow(&sender_updated, caller);
        ledger.allow(&receiver_updated, to);

        if let Some(storage) = ledger.contracts.get_mut(&contract) {
            storage.balances.insert(caller, sender_updated);
            storage.balances.insert(to, receiver_updated);
        }
        let receipt = ledger.mine(Vec::new());
        info!(%contract, from = %caller, %to, tx = %receipt.hash, "Transfer mined");
        Ok(receipt.hash)
    }

    async fn wait_for_receipt(&self, tx: TxHash) -> Result<TxReceipt, ContractError> {
        let receipt = self
            .inner
            .ledger()
            .receipt(&tx)
            .cloned()
            .ok_or(ContractError::UnknownTransaction(tx))?;
        debug!(%tx, block = receipt.block_number, "Receipt available");
        if receipt.status != 1 {
            return Err(ContractError::Reverted(format!("transaction {tx} failed")));
        }
        Ok(receipt)
    }
}
