//! Devnet chain state and the simulated FHE coprocessor
//!
//! Ciphertexts are stored in clear next to their handle together with an
//! access-control list, the same bookkeeping the real coprocessor keeps.
//! Arithmetic follows `euint64` semantics: addition wraps, subtraction is
//! guarded by an encrypted comparison and a select.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::types::{Address, ContractEvent, EncryptedHandle, TxHash, TxReceipt};

#[derive(Debug, Clone)]
pub(crate) struct Ciphertext {
    pub value: u64,
    pub acl: HashSet<Address>,
}

/// Encrypted input submitted by a user, not yet consumed by a contract
#[derive(Debug, Clone)]
pub(crate) struct PendingInput {
    pub value: u64,
    pub contract: Address,
    pub user: Address,
    pub proof: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct ContractStorage {
    pub balances: HashMap<Address, EncryptedHandle>,
    pub events: Vec<ContractEvent>,
}

#[derive(Debug)]
pub(crate) struct Ledger {
    chain_id: u64,
    block_number: u64,
    handle_nonce: u64,
    ciphertexts: HashMap<EncryptedHandle, Ciphertext>,
    inputs: HashMap<EncryptedHandle, PendingInput>,
    pub contracts: HashMap<Address, ContractStorage>,
    deploy_nonces: HashMap<Address, u64>,
    receipts: HashMap<TxHash, TxReceipt>,
}

impl Ledger {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            block_number: 0,
            handle_nonce: 0,
            ciphertexts: HashMap::new(),
            inputs: HashMap::new(),
            contracts: HashMap::new(),
            deploy_nonces: HashMap::new(),
            receipts: HashMap::new(),
        }
    }

    fn next_handle(&mut self, domain: &[u8]) -> EncryptedHandle {
        self.handle_nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update(self.chain_id.to_be_bytes());
        hasher.update(self.handle_nonce.to_be_bytes());
        EncryptedHandle(hasher.finalize().into())
    }

    // ==================== Deployment ====================

    /// Deterministic address derived from (deployer, deployer nonce)
    pub fn create_contract(&mut self, deployer: Address) -> Address {
        let nonce = self.deploy_nonces.entry(deployer).or_insert(0);
        let mut hasher = Sha256::new();
        hasher.update(b"devnet:create");
        hasher.update(deployer.as_bytes());
        hasher.update(nonce.to_be_bytes());
        *nonce += 1;

        let digest: [u8; 32] = hasher.finalize().into();
        let mut address = [0u8; 20];
        address.copy_from_slice(&digest[12..]);
        let address = Address(address);

        self.contracts.insert(address, ContractStorage::default());
        self.block_number += 1;
        address
    }

    // ==================== Encrypted Inputs ====================

    pub fn register_inputs(
        &mut self,
        contract: Address,
        user: Address,
        values: &[u64],
    ) -> (Vec<EncryptedHandle>, Vec<u8>) {
        let handles: Vec<EncryptedHandle> = values
            .iter()
            .map(|_| self.next_handle(b"devnet:input"))
            .collect();
        let proof = input_proof(contract, user, &handles);
        for (handle, &value) in handles.iter().zip(values) {
            self.inputs.insert(
                *handle,
                PendingInput {
                    value,
                    contract,
                    user,
                    proof: proof.clone(),
                },
            );
        }
        (handles, proof)
    }

    /// `FHE.fromExternal`: check the proof binds the handle to this
    /// (contract, user) and turn it into a ciphertext the contract may use
    pub fn from_external(
        &mut self,
        handle: EncryptedHandle,
        proof: &[u8],
        contract: Address,
        user: Address,
    ) -> Option<EncryptedHandle> {
        let input = self.inputs.get(&handle)?;
        if input.contract != contract || input.user != user || input.proof != proof {
            return None;
        }
        let value = input.value;
        self.inputs.remove(&handle);

        let ciphertext = self.next_handle(b"devnet:ciphertext");
        self.ciphertexts.insert(
            ciphertext,
            Ciphertext {
                value,
                acl: HashSet::from([contract]),
            },
        );
        Some(ciphertext)
    }

    // ==================== FHE Operations ====================

    /// Clear value behind a handle; the zero handle reads as 0
    fn value_of(&self, handle: &EncryptedHandle) -> u64 {
        self.ciphertexts.get(handle).map(|c| c.value).unwrap_or(0)
    }

    fn store(&mut self, value: u64, owner: Address) -> EncryptedHandle {
        let handle = self.next_handle(b"devnet:ciphertext");
        self.ciphertexts.insert(
            handle,
            Ciphertext {
                value,
                acl: HashSet::from([owner]),
            },
        );
        handle
    }

    pub fn add(
        &mut self,
        lhs: &EncryptedHandle,
        rhs: &EncryptedHandle,
        owner: Address,
    ) -> EncryptedHandle {
        let value = self.value_of(lhs).wrapping_add(self.value_of(rhs));
        self.store(value, owner)
    }

    /// `select(le(amount, balance), sub(balance, amount), balance)` plus the
    /// amount actually moved (`select(ok, amount, 0)`)
    pub fn checked_sub(
        &mut self,
        balance: &EncryptedHandle,
        amount: &EncryptedHandle,
        owner: Address,
    ) -> (EncryptedHandle, EncryptedHandle) {
        let balance = self.value_of(balance);
        let amount = self.value_of(amount);
        let (remaining, moved) = if amount <= balance {
            (balance - amount, amount)
        } else {
            (balance, 0)
        };
        (self.store(remaining, owner), self.store(moved, owner))
    }

    pub fn allow(&mut self, handle: &EncryptedHandle, account: Address) {
        if let Some(ciphertext) = self.ciphertexts.get_mut(handle) {
            ciphertext.acl.insert(account);
        }
    }

    pub fn ciphertext(&self, handle: &EncryptedHandle) -> Option<&Ciphertext> {
        self.ciphertexts.get(handle)
    }

    // ==================== Transactions ====================

    pub fn mine(&mut self, events: Vec<ContractEvent>) -> TxReceipt {
        self.block_number += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"devnet:tx");
        hasher.update(self.chain_id.to_be_bytes());
        hasher.update(self.block_number.to_be_bytes());
        let receipt = TxReceipt {
            hash: TxHash(hasher.finalize().into()),
            block_number: self.block_number,
            status: 1,
            events,
        };
        self.receipts.insert(receipt.hash, receipt.clone());
        receipt
    }

    pub fn receipt(&self, hash: &TxHash) -> Option<&TxReceipt> {
        self.receipts.get(hash)
    }
}

fn input_proof(contract: Address, user: Address, handles: &[EncryptedHandle]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"devnet:input-proof");
    hasher.update(contract.as_bytes());
    hasher.update(user.as_bytes());
    for handle in handles {
        hasher.update(handle.0);
    }
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: Address = Address([0xc0; 20]);
    const ALICE: Address = Address([0xa1; 20]);
    const BOB: Address = Address([0xb0; 20]);

    #[test]
    fn test_input_is_bound_to_contract_and_user() {
        let mut ledger = Ledger::new(31337);
        let (handles, proof) = ledger.register_inputs(CONTRACT, ALICE, &[500]);

        assert!(ledger.from_external(handles[0], &proof, CONTRACT, BOB).is_none());
        assert!(ledger
            .from_external(handles[0], &proof, Address([1; 20]), ALICE)
            .is_none());
        assert!(ledger
            .from_external(handles[0], &[0u8; 32], CONTRACT, ALICE)
            .is_none());

        let ciphertext = ledger
            .from_external(handles[0], &proof, CONTRACT, ALICE)
            .unwrap();
        assert_eq!(ledger.ciphertext(&ciphertext).unwrap().value, 500);

        // consumed
        assert!(ledger
            .from_external(handles[0], &proof, CONTRACT, ALICE)
            .is_none());
    }

    #[test]
    fn test_add_wraps_like_euint64() {
        let mut ledger = Ledger::new(31337);
        let a = ledger.store(u64::MAX, CONTRACT);
        let b = ledger.store(2, CONTRACT);
        let sum = ledger.add(&a, &b, CONTRACT);
        assert_eq!(ledger.ciphertext(&sum).unwrap().value, 1);

        let from_zero = ledger.add(&EncryptedHandle::ZERO, &b, CONTRACT);
        assert_eq!(ledger.ciphertext(&from_zero).unwrap().value, 2);
    }

    #[test]
    fn test_checked_sub_never_underflows() {
        let mut ledger = Ledger::new(31337);
        let balance = ledger.store(1000, CONTRACT);
        let small = ledger.store(400, CONTRACT);
        let large = ledger.store(5000, CONTRACT);

        let (remaining, moved) = ledger.checked_sub(&balance, &small, CONTRACT);
        assert_eq!(ledger.ciphertext(&remaining).unwrap().value, 600);
        assert_eq!(ledger.ciphertext(&moved).unwrap().value, 400);

        let (remaining, moved) = ledger.checked_sub(&balance, &large, CONTRACT);
        assert_eq!(ledger.ciphertext(&remaining).unwrap().value, 1000);
        assert_eq!(ledger.ciphertext(&moved).unwrap().value, 0);
    }

    #[test]
    fn test_contract_addresses_are_deterministic() {
        let mut first = Ledger::new(31337);
        let mut second = Ledger::new(31337);
        let a1 = first.create_contract(ALICE);
        let a2 = first.create_contract(ALICE);
        assert_ne!(a1, a2);
        assert_eq!(second.create_contract(ALICE), a1);
        assert!(!a1.is_zero());
    }

    #[test]
    fn test_mined_receipts_are_retrievable() {
        let mut ledger = Ledger::new(31337);
        let receipt = ledger.mine(vec![ContractEvent::Deposit { user: ALICE }]);
        assert_eq!(receipt.status, 1);
        assert_eq!(
            ledger.receipt(&receipt.hash).unwrap().events,
            vec![ContractEvent::Deposit { user: ALICE }]
        );
    }
}
