//! Network / identity context
//!
//! Tracks the connected chain and account. Every change advances a
//! generation counter so that work started under an older environment can
//! be recognised as stale when it completes.

use serde::Serialize;

use crate::types::Address;

/// Captured view of the network at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub chain_id: Option<u64>,
    pub account: Option<Address>,
    pub generation: u64,
}

#[derive(Debug, Default, Clone)]
pub struct NetworkContext {
    chain_id: Option<u64>,
    account: Option<Address>,
    generation: u64,
}

impl NetworkContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_connected(&self) -> bool {
        self.chain_id.is_some() && self.account.is_some()
    }

    /// `account` is `None` for a read-only connection
    pub fn connect(&mut self, chain_id: u64, account: Option<Address>) {
        self.chain_id = Some(chain_id);
        self.account = account;
        self.generation += 1;
    }

    pub fn switch_chain(&mut self, chain_id: u64) {
        self.chain_id = Some(chain_id);
        self.generation += 1;
    }

    pub fn switch_account(&mut self, account: Address) {
        self.account = Some(account);
        self.generation += 1;
    }

    pub fn disconnect(&mut self) {
        self.chain_id = None;
        self.account = None;
        self.generation += 1;
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            chain_id: self.chain_id,
            account: self.account,
            generation: self.generation,
        }
    }

    /// The given chain id is still the connected one
    pub fn same_chain(&self, chain_id: Option<u64>) -> bool {
        chain_id.is_some() && self.chain_id == chain_id
    }

    /// The given signer address is still the connected account
    pub fn same_signer(&self, signer: Option<Address>) -> bool {
        signer.is_some() && self.account == signer
    }

    /// Nothing changed since `snapshot` was taken
    pub fn is_current(&self, snapshot: &NetworkSnapshot) -> bool {
        self.generation == snapshot.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_chain_and_signer() {
        let alice = Address([1; 20]);
        let mut ctx = NetworkContext::new();
        assert!(!ctx.same_chain(None));
        assert!(!ctx.same_signer(None));

        ctx.connect(31337, Some(alice));
        assert!(ctx.same_chain(Some(31337)));
        assert!(!ctx.same_chain(Some(1)));
        assert!(ctx.same_signer(Some(alice)));
        assert!(!ctx.same_signer(Some(Address([2; 20]))));
    }

    #[test]
    fn test_every_change_advances_generation() {
        let mut ctx = NetworkContext::new();
        ctx.connect(31337, Some(Address([1; 20])));
        let snapshot = ctx.snapshot();
        assert!(ctx.is_current(&snapshot));

        ctx.switch_chain(31337);
        assert!(!ctx.is_current(&snapshot));

        let snapshot = ctx.snapshot();
        ctx.switch_account(Address([2; 20]));
        assert!(!ctx.is_current(&snapshot));

        ctx.disconnect();
        assert!(!ctx.is_connected());
        assert_eq!(ctx.generation(), 4);
    }
}
