//! End-to-end balance flows against the in-process devnet
//! Run with: cargo test -p wealth-server --test cipher_wealth_flow

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use wealth_server::clock::ManualClock;
use wealth_server::deploy::deploy_cipher_wealth;
use wealth_server::devnet::{DevSigner, Devnet, DevnetConfig};
use wealth_server::registry::{ChainRegistry, DeploymentTable};
use wealth_server::services::controller::{BalanceController, LaneState, Outcome};
use wealth_server::services::gateway::{EncryptionGateway, GatewayError};
use wealth_server::services::readiness::Gates;
use wealth_server::services::signature::{DecryptionSignatureCache, InMemoryStorage};
use wealth_server::types::{Address, ContractAbi, ContractEvent, DecryptionSignature};

const START: i64 = 1_700_000_000;
const YEAR: i64 = 365 * DecryptionSignature::SECONDS_PER_DAY;

struct Harness {
    clock: Arc<ManualClock>,
    devnet: Devnet,
    registry: Arc<ChainRegistry>,
    contract: Address,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let devnet = Devnet::new(&DevnetConfig::default(), clock.clone());
        let mut registry =
            ChainRegistry::new(ContractAbi::cipher_wealth().unwrap(), DeploymentTable::new());
        let contract = deploy_cipher_wealth(&devnet, &mut registry).unwrap().address;
        Self {
            clock,
            devnet,
            registry: Arc::new(registry),
            contract,
        }
    }

    fn signatures(&self) -> Arc<DecryptionSignatureCache> {
        Arc::new(DecryptionSignatureCache::new(
            Arc::new(InMemoryStorage::new()),
            self.clock.clone(),
            365,
        ))
    }

    fn account(&self, index: usize) -> Address {
        self.devnet.accounts()[index]
    }

    /// Controller connected as dev account `index`
    fn connect(&self, index: usize) -> (BalanceController, Arc<DevSigner>) {
        let controller =
            BalanceController::new(self.registry.clone(), self.signatures(), Duration::ZERO);
        let signer = self.devnet.signer(&self.account(index)).unwrap();
        controller.connect(self.devnet.chain_id(), self.devnet.providers(signer.clone()));
        (controller, signer)
    }
}

async fn decrypted(controller: &BalanceController) -> u64 {
    if controller.view().is_decrypted {
        assert_eq!(controller.refresh_balance().await, Outcome::Succeeded);
    }
    assert_eq!(controller.decrypt_balance().await, Outcome::Succeeded);
    controller.view().clear_value.unwrap()
}

#[tokio::test]
async fn test_deposits_accumulate() {
    let h = Harness::new();
    let (alice, _) = h.connect(1);

    assert_eq!(alice.deposit(500).await, Outcome::Succeeded);
    assert_eq!(alice.view().message, "Balance handle retrieved successfully");
    assert_eq!(decrypted(&alice).await, 500);
    assert_eq!(alice.view().message, "Decrypted balance: 500");

    assert_eq!(alice.deposit(300).await, Outcome::Succeeded);
    assert!(!alice.view().is_decrypted);
    assert_eq!(decrypted(&alice).await, 800);

    let events = h.devnet.events(&h.contract);
    assert_eq!(
        events,
        vec![
            ContractEvent::Deposit { user: h.account(1) },
            ContractEvent::Deposit { user: h.account(1) },
        ]
    );
}

#[tokio::test]
async fn test_withdraw_reduces_balance() {
    let h = Harness::new();
    let (alice, _) = h.connect(1);

    alice.deposit(1000).await;
    assert_eq!(alice.withdraw(400).await, Outcome::Succeeded);
    assert_eq!(alice.view().operate, LaneState::Succeeded);
    assert_eq!(decrypted(&alice).await, 600);
}

#[tokio::test]
async fn test_over_withdraw_moves_nothing() {
    let h = Harness::new();
    let (alice, _) = h.connect(1);

    alice.deposit(100).await;
    // the transaction succeeds; the encrypted select keeps the balance
    assert_eq!(alice.withdraw(5000).await, Outcome::Succeeded);
    assert_eq!(decrypted(&alice).await, 100);
}

#[tokio::test]
async fn test_transfer_moves_between_accounts() {
    let h = Harness::new();
    let (alice, _) = h.connect(1);
    let (bob, _) = h.connect(2);

    alice.deposit(1000).await;
    assert_eq!(alice.transfer(h.account(2), 300).await, Outcome::Succeeded);
    assert_eq!(
        alice.view().message,
        format!("Successfully transferred 300 to {}", h.account(2))
    );
    assert_eq!(decrypted(&alice).await, 700);

    assert_eq!(bob.refresh_balance().await, Outcome::Succeeded);
    assert_eq!(decrypted(&bob).await, 300);
}

#[tokio::test]
async fn test_transfer_reverts_leave_balances_unchanged() {
    let h = Harness::new();
    let (alice, _) = h.connect(1);

    alice.deposit(50).await;
    let before = alice.view().balance_handle;

    let outcome = alice.transfer(Address::ZERO, 10).await;
    assert_eq!(
        outcome,
        Outcome::Failed("execution reverted: Cannot transfer to zero address".into())
    );
    assert_eq!(
        alice.view().message,
        "Transfer error: execution reverted: Cannot transfer to zero address"
    );

    let outcome = alice.transfer(h.account(1), 10).await;
    assert_eq!(
        outcome,
        Outcome::Failed("execution reverted: Cannot transfer to yourself".into())
    );

    let view = alice.view();
    assert!(matches!(view.operate, LaneState::Failed(_)));
    assert!(view.gates.can_operate);
    assert_eq!(view.balance_handle, before);
    assert_eq!(decrypted(&alice).await, 50);
}

#[tokio::test]
async fn test_signature_reused_until_expiry() {
    let h = Harness::new();
    let (alice, signer) = h.connect(1);

    alice.deposit(10).await;
    assert_eq!(decrypted(&alice).await, 10);
    alice.deposit(5).await;
    assert_eq!(decrypted(&alice).await, 15);
    assert_eq!(signer.prompts(), 1);

    h.clock.advance(YEAR - 1);
    assert_eq!(decrypted(&alice).await, 15);
    assert_eq!(signer.prompts(), 1);

    h.clock.advance(1);
    assert_eq!(decrypted(&alice).await, 15);
    assert_eq!(signer.prompts(), 2);
}

#[tokio::test]
async fn test_other_user_handle_is_readable_not_decryptable() {
    let h = Harness::new();
    let (alice, _) = h.connect(1);
    let (bob, bob_signer) = h.connect(2);

    alice.deposit(42).await;
    let alice_handle = alice.view().balance_handle.unwrap();

    let seen_by_bob = assert_ok!(bob.balance_of(h.account(1)).await);
    assert_eq!(seen_by_bob, alice_handle);

    let gateway = EncryptionGateway::new(h.devnet.instance());
    let bob_signature = h
        .signatures()
        .load_or_sign(gateway.instance(), &[h.contract], bob_signer.as_ref())
        .await
        .unwrap();

    let err = assert_err!(gateway.decrypt(alice_handle, h.contract, &bob_signature).await);
    assert!(matches!(err, GatewayError::Unauthorized(_)));
}

#[tokio::test]
async fn test_undeployed_chain_reports_missing_deployment() {
    let h = Harness::new();
    let (alice, signer) = h.connect(1);

    alice.connect(11155111, h.devnet.providers(signer));
    let view = alice.view();

    assert!(!view.is_deployed);
    assert_eq!(view.contract_address, None);
    assert_eq!(view.gates, Gates::none());
    assert_eq!(
        view.message,
        "CipherWealth deployment not found for chainId=11155111."
    );
    assert_eq!(alice.deposit(1).await, Outcome::Skipped);
}

#[tokio::test]
async fn test_account_switch_resets_view() {
    let h = Harness::new();
    let (controller, _) = h.connect(1);

    controller.deposit(20).await;
    assert_eq!(decrypted(&controller).await, 20);
    let generation = controller.view().network.generation;

    controller.accounts_changed(h.account(2));
    let view = controller.view();
    assert_eq!(view.network.generation, generation + 1);
    assert_eq!(view.clear_value, None);
    assert_eq!(view.balance_handle, None);
    assert_eq!(view.gates, Gates::none());

    let bob = h.devnet.signer(&h.account(2)).unwrap();
    controller.connect(h.devnet.chain_id(), h.devnet.providers(bob));
    assert_eq!(controller.refresh_balance().await, Outcome::Succeeded);
    assert!(controller.view().balance_handle.unwrap().is_zero());
}

#[tokio::test]
async fn test_protocol_id() {
    let h = Harness::new();
    let (alice, _) = h.connect(1);
    assert_eq!(assert_ok!(alice.protocol_id().await), 10001);
}
