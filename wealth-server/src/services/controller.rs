//! Balance Interaction Controller
//!
//! Coordinates wallet signing, input encryption, transaction submission and
//! authenticated decryption for the connected account.
//!
//! ## Lanes
//!
//! Three independent lanes (refresh, decrypt, operate) each move
//! `Idle -> InFlight -> Succeeded | Failed`. A lane's gate is checked and
//! the lane marked in flight under one lock acquisition, before the first
//! suspension point, so a second invocation always observes the gate
//! closed. Deposit, withdraw and transfer share the operate lane.
//!
//! ## Staleness
//!
//! Every action captures a [`NetworkSnapshot`] when it starts. If the chain
//! or account changed by the time its I/O completes, the result is dropped
//! and the action reports [`Outcome::Discarded`].
//!
//! ## Failures
//!
//! Actions never return errors. Failures become a status message and a
//! `Failed` lane; the balance is left as it was.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::network::{NetworkContext, NetworkSnapshot};
use crate::registry::ChainRegistry;
use crate::services::contract::{CipherWealthContract, ContractError, WalletSigner};
use crate::services::gateway::{EncryptionGateway, GatewayError};
use crate::services::readiness::{GateInputs, Gates};
use crate::services::signature::DecryptionSignatureCache;
use crate::types::{Address, ChainContractInfo, EncryptedHandle, TxReceipt};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Wallet not connected")]
    NotConnected,
    #[error("CipherWealth deployment not found for chainId={0}")]
    NotDeployed(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// State of one lane
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum LaneState {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    Failed(String),
}

impl LaneState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, LaneState::InFlight)
    }
}

/// What the controller knows about the balance. A clear value only exists
/// together with the exact handle it was decrypted from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BalanceState {
    #[default]
    Unknown,
    Encrypted(EncryptedHandle),
    Decrypted { handle: EncryptedHandle, clear: u64 },
}

impl BalanceState {
    pub fn handle(&self) -> Option<EncryptedHandle> {
        match self {
            BalanceState::Unknown => None,
            BalanceState::Encrypted(handle) | BalanceState::Decrypted { handle, .. } => {
                Some(*handle)
            }
        }
    }

    pub fn clear(&self) -> Option<u64> {
        match self {
            BalanceState::Decrypted { clear, .. } => Some(*clear),
            _ => None,
        }
    }

    pub fn is_decrypted(&self) -> bool {
        matches!(self, BalanceState::Decrypted { .. })
    }

    /// Drop the clear value; the on-chain balance moved
    fn invalidate(&mut self) {
        if let BalanceState::Decrypted { handle, .. } = *self {
            *self = BalanceState::Encrypted(handle);
        }
    }
}

/// Result of one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "camelCase")]
pub enum Outcome {
    /// Gate closed; nothing happened
    Skipped,
    Succeeded,
    Failed(String),
    /// Completed after the chain or account changed; result dropped
    Discarded,
}

/// Dependencies acquired from the wallet for one chain/account
#[derive(Clone, Default)]
pub struct Providers {
    pub instance: Option<EncryptionGateway>,
    pub read_provider: Option<Arc<dyn CipherWealthContract>>,
    pub write_provider: Option<Arc<dyn CipherWealthContract>>,
    pub signer: Option<Arc<dyn WalletSigner>>,
}

/// Providers plus the network they were acquired under
struct Session {
    providers: Providers,
    chain_id: u64,
    signer: Option<Address>,
}

/// Mutating operations sharing the operate lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit,
    Withdraw,
    Transfer { to: Address },
}

impl Operation {
    fn progress(&self, amount: u64) -> String {
        match self {
            Operation::Deposit => format!("Depositing {amount}..."),
            Operation::Withdraw => format!("Withdrawing {amount}..."),
            Operation::Transfer { to } => format!("Transferring {amount} to {to}..."),
        }
    }

    fn success(&self, amount: u64) -> String {
        match self {
            Operation::Deposit => format!("Successfully deposited {amount}"),
            Operation::Withdraw => format!("Successfully withdrew {amount}"),
            Operation::Transfer { to } => format!("Successfully transferred {amount} to {to}"),
        }
    }

    fn error_prefix(&self) -> &'static str {
        match self {
            Operation::Deposit => "Deposit error",
            Operation::Withdraw => "Withdrawal error",
            Operation::Transfer { .. } => "Transfer error",
        }
    }
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub network: NetworkSnapshot,
    pub contract_address: Option<Address>,
    pub chain_name: Option<String>,
    pub is_deployed: bool,
    pub balance_handle: Option<EncryptedHandle>,
    pub clear_value: Option<u64>,
    pub is_decrypted: bool,
    pub refresh: LaneState,
    pub decrypt: LaneState,
    pub operate: LaneState,
    #[serde(flatten)]
    pub gates: Gates,
    pub message: String,
}

struct ControllerState {
    network: NetworkContext,
    session: Option<Session>,
    contract: ChainContractInfo,
    balance: BalanceState,
    refresh: LaneState,
    decrypt: LaneState,
    operate: LaneState,
    message: String,
}

impl ControllerState {
    fn gate_inputs(&self) -> GateInputs {
        let providers = self.session.as_ref().map(|s| &s.providers);
        GateInputs {
            instance_ready: providers.map(|p| p.instance.is_some()).unwrap_or(false),
            deployed: self.contract.is_deployed(),
            read_provider: providers.map(|p| p.read_provider.is_some()).unwrap_or(false),
            write_provider: providers.map(|p| p.write_provider.is_some()).unwrap_or(false),
            signer: providers.map(|p| p.signer.is_some()).unwrap_or(false),
            same_chain: self
                .session
                .as_ref()
                .map(|s| self.network.same_chain(Some(s.chain_id)))
                .unwrap_or(false),
            same_signer: self
                .session
                .as_ref()
                .map(|s| self.network.same_signer(s.signer))
                .unwrap_or(false),
            held_handle: self.balance.handle(),
            refreshing: self.refresh.is_in_flight(),
            decrypting: self.decrypt.is_in_flight(),
            decrypted: self.balance.is_decrypted(),
            operating: self.operate.is_in_flight(),
        }
    }

    fn gates(&self) -> Gates {
        Gates::evaluate(&self.gate_inputs())
    }

    fn providers(&self) -> Option<&Providers> {
        self.session.as_ref().map(|s| &s.providers)
    }
}

struct RefreshJob {
    snapshot: NetworkSnapshot,
    contract: Address,
    caller: Address,
    reader: Arc<dyn CipherWealthContract>,
}

struct DecryptJob {
    snapshot: NetworkSnapshot,
    contract: Address,
    handle: EncryptedHandle,
    gateway: EncryptionGateway,
    signer: Arc<dyn WalletSigner>,
}

struct OperateJob {
    snapshot: NetworkSnapshot,
    contract: Address,
    caller: Address,
    gateway: EncryptionGateway,
    writer: Arc<dyn CipherWealthContract>,
}

pub struct BalanceController {
    registry: Arc<ChainRegistry>,
    signatures: Arc<DecryptionSignatureCache>,
    refresh_delay: Duration,
    state: Mutex<ControllerState>,
}

impl BalanceController {
    pub fn new(
        registry: Arc<ChainRegistry>,
        signatures: Arc<DecryptionSignatureCache>,
        refresh_delay: Duration,
    ) -> Self {
        let contract = registry.resolve(None);
        Self {
            registry,
            signatures,
            refresh_delay,
            state: Mutex::new(ControllerState {
                network: NetworkContext::new(),
                session: None,
                contract,
                balance: BalanceState::Unknown,
                refresh: LaneState::Idle,
                decrypt: LaneState::Idle,
                operate: LaneState::Idle,
                message: String::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    // ==================== Wallet Events ====================

    /// Attach a wallet connection for `chain_id`.
    ///
    /// The session records the chain the FHE instance was created for, not
    /// the one the wallet reports. Providers bound to another chain are not
    /// attached, which keeps every gate closed.
    pub fn connect(&self, chain_id: u64, providers: Providers) {
        let signer = providers.signer.as_ref().map(|s| s.address());
        let acquired_chain = providers.instance.as_ref().map(|g| g.chain_id());
        let mut st = self.state();
        st.network.connect(chain_id, signer);
        st.session = match acquired_chain {
            Some(provider_chain) if provider_chain != chain_id => {
                warn!(
                    chain_id,
                    provider_chain, "Providers belong to another chain, not attached"
                );
                None
            }
            _ => Some(Session {
                providers,
                chain_id: acquired_chain.unwrap_or(chain_id),
                signer,
            }),
        };
        self.on_network_change(&mut st);
        info!(chain_id, account = ?signer, "Wallet connected");
    }

    /// Wallet reported a chain switch; providers must be re-attached
    pub fn chain_changed(&self, chain_id: u64) {
        let mut st = self.state();
        st.network.switch_chain(chain_id);
        self.on_network_change(&mut st);
        info!(chain_id, "Chain changed");
    }

    /// Wallet reported an account switch; the signer must be re-attached
    pub fn accounts_changed(&self, account: Address) {
        let mut st = self.state();
        st.network.switch_account(account);
        self.on_network_change(&mut st);
        info!(%account, "Account changed");
    }

    pub fn disconnect(&self) {
        let mut st = self.state();
        st.network.disconnect();
        st.session = None;
        self.on_network_change(&mut st);
        st.message = "Wallet disconnected".to_string();
        info!("Wallet disconnected");
    }

    fn on_network_change(&self, st: &mut ControllerState) {
        st.contract = self.registry.resolve(st.network.chain_id());
        st.balance = BalanceState::Unknown;
        st.refresh = LaneState::Idle;
        st.decrypt = LaneState::Idle;
        st.operate = LaneState::Idle;
        st.message = match st.network.chain_id() {
            Some(chain_id) if !st.contract.is_deployed() => {
                warn!(chain_id, "CipherWealth not deployed on this chain");
                format!("CipherWealth deployment not found for chainId={chain_id}.")
            }
            _ => String::new(),
        };
    }

    // ==================== Queries ====================

    pub fn gates(&self) -> Gates {
        self.state().gates()
    }

    pub fn contract_info(&self) -> ChainContractInfo {
        self.state().contract.clone()
    }

    pub fn view(&self) -> BalanceView {
        let st = self.state();
        BalanceView {
            network: st.network.snapshot(),
            contract_address: st.contract.address,
            chain_name: st.contract.chain_name.clone(),
            is_deployed: st.contract.is_deployed(),
            balance_handle: st.balance.handle(),
            clear_value: st.balance.clear(),
            is_decrypted: st.balance.is_decrypted(),
            refresh: st.refresh.clone(),
            decrypt: st.decrypt.clone(),
            operate: st.operate.clone(),
            gates: st.gates(),
            message: st.message.clone(),
        }
    }

    /// Contract address and read provider for the connected chain. The
    /// provider must have been acquired on that chain.
    fn reader(&self) -> Result<(Address, Arc<dyn CipherWealthContract>), ControllerError> {
        let st = self.state();
        let chain_id = st.network.chain_id().ok_or(ControllerError::NotConnected)?;
        let contract = st
            .contract
            .address
            .ok_or_else(|| ControllerError::NotDeployed(chain_id.to_string()))?;
        let reader = st
            .session
            .as_ref()
            .filter(|s| st.network.same_chain(Some(s.chain_id)))
            .and_then(|s| s.providers.read_provider.clone())
            .ok_or(ControllerError::NotConnected)?;
        Ok((contract, reader))
    }

    /// Encrypted balance handle of any user. Only that user can decrypt it.
    pub async fn balance_of(&self, user: Address) -> Result<EncryptedHandle, ControllerError> {
        let (contract, reader) = self.reader()?;
        Ok(reader.get_balance_of(contract, user).await?)
    }

    pub async fn protocol_id(&self) -> Result<u64, ControllerError> {
        let (contract, reader) = self.reader()?;
        Ok(reader.protocol_id(contract).await?)
    }

    // ==================== Refresh ====================

    /// Fetch the connected account's balance handle. Any previously
    /// decrypted value is dropped.
    #[instrument(skip(self))]
    pub async fn refresh_balance(&self) -> Outcome {
        let Some(job) = self.begin_refresh() else {
            debug!("Refresh gate closed");
            return Outcome::Skipped;
        };

        let result = job.reader.get_balance(job.contract, job.caller).await;
        self.finish_refresh(&job, result)
    }

    fn begin_refresh(&self) -> Option<RefreshJob> {
        let mut st = self.state();
        if !st.gates().can_fetch_balance {
            return None;
        }
        let providers = st.providers()?;
        let reader = providers.read_provider.clone()?;
        let caller = providers.signer.as_ref()?.address();
        let contract = st.contract.address?;

        st.refresh = LaneState::InFlight;
        st.message = "Fetching encrypted balance...".to_string();
        Some(RefreshJob {
            snapshot: st.network.snapshot(),
            contract,
            caller,
            reader,
        })
    }

    fn finish_refresh(
        &self,
        job: &RefreshJob,
        result: Result<EncryptedHandle, ContractError>,
    ) -> Outcome {
        let mut st = self.state();
        if !st.network.is_current(&job.snapshot) {
            warn!(
                started = job.snapshot.generation,
                current = st.network.generation(),
                "Discarding stale balance refresh"
            );
            return Outcome::Discarded;
        }

        match result {
            Ok(handle) => {
                st.balance = BalanceState::Encrypted(handle);
                st.refresh = LaneState::Succeeded;
                st.message = "Balance handle retrieved successfully".to_string();
                info!(%handle, "Balance handle retrieved");
                Outcome::Succeeded
            }
            Err(e) => {
                error!(error = %e, "Failed to get balance");
                let reason = e.to_string();
                st.refresh = LaneState::Failed(reason.clone());
                st.message = format!("Error: {reason}");
                Outcome::Failed(reason)
            }
        }
    }

    // ==================== Decrypt ====================

    /// Decrypt the held balance handle with the user's decryption signature
    #[instrument(skip(self))]
    pub async fn decrypt_balance(&self) -> Outcome {
        let Some(job) = self.begin_decrypt() else {
            debug!("Decrypt gate closed");
            return Outcome::Skipped;
        };

        let signature = self
            .signatures
            .load_or_sign(job.gateway.instance(), &[job.contract], job.signer.as_ref())
            .await;

        let result = match signature {
            Some(signature) => job
                .gateway
                .decrypt(job.handle, job.contract, &signature)
                .await
                .map_err(|e| format!("Decryption error: {e}")),
            None => Err("Unable to build decryption signature".to_string()),
        };
        self.finish_decrypt(&job, result)
    }

    fn begin_decrypt(&self) -> Option<DecryptJob> {
        let mut st = self.state();
        if !st.gates().can_decrypt {
            return None;
        }
        let providers = st.providers()?;
        let gateway = providers.instance.clone()?;
        let signer = providers.signer.clone()?;
        let contract = st.contract.address?;
        let handle = st.balance.handle()?;

        st.decrypt = LaneState::InFlight;
        st.message = "Decrypting balance...".to_string();
        Some(DecryptJob {
            snapshot: st.network.snapshot(),
            contract,
            handle,
            gateway,
            signer,
        })
    }

    fn finish_decrypt(&self, job: &DecryptJob, result: Result<u64, String>) -> Outcome {
        let mut st = self.state();
        if !st.network.is_current(&job.snapshot) {
            warn!("Discarding stale decryption");
            return Outcome::Discarded;
        }

        if st.balance != BalanceState::Encrypted(job.handle) {
            // a refresh replaced the handle while we were decrypting
            warn!(handle = %job.handle, "Decrypted handle is no longer current");
            st.decrypt = LaneState::Idle;
            return Outcome::Discarded;
        }

        match result {
            Ok(clear) => {
                st.balance = BalanceState::Decrypted {
                    handle: job.handle,
                    clear,
                };
                st.decrypt = LaneState::Succeeded;
                st.message = format!("Decrypted balance: {clear}");
                info!(handle = %job.handle, "Balance decrypted");
                Outcome::Succeeded
            }
            Err(message) => {
                error!(error = %message, "Failed to decrypt balance");
                st.decrypt = LaneState::Failed(message.clone());
                st.message = message.clone();
                Outcome::Failed(message)
            }
        }
    }

    // ==================== Operate ====================

    pub async fn deposit(&self, amount: u64) -> Outcome {
        self.operate(Operation::Deposit, amount).await
    }

    pub async fn withdraw(&self, amount: u64) -> Outcome {
        self.operate(Operation::Withdraw, amount).await
    }

    pub async fn transfer(&self, to: Address, amount: u64) -> Outcome {
        self.operate(Operation::Transfer { to }, amount).await
    }

    /// Encrypt `amount`, submit the transaction and wait for it to be mined.
    /// On success the balance is refreshed after the configured delay,
    /// within the same task.
    #[instrument(skip(self), fields(op_id = %Uuid::new_v4()))]
    pub async fn operate(&self, operation: Operation, amount: u64) -> Outcome {
        let job = match self.begin_operate(operation, amount) {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!("Operate gate closed");
                return Outcome::Skipped;
            }
            Err(outcome) => return outcome,
        };

        let result = Self::submit(&job, operation, amount).await;
        let outcome = self.finish_operate(&job, operation, amount, result);

        if outcome == Outcome::Succeeded {
            tokio::time::sleep(self.refresh_delay).await;
            let follow_up = self.refresh_balance().await;
            debug!(?follow_up, "Post-operation refresh");
        }
        outcome
    }

    fn begin_operate(
        &self,
        operation: Operation,
        amount: u64,
    ) -> Result<Option<OperateJob>, Outcome> {
        let mut st = self.state();
        if !st.gates().can_operate {
            return Ok(None);
        }
        if amount == 0 {
            let reason = "Amount must be a positive integer".to_string();
            st.message = format!("{}: {reason}", operation.error_prefix());
            return Err(Outcome::Failed(reason));
        }

        let Some(job) = st.providers().and_then(|providers| {
            Some(OperateJob {
                snapshot: st.network.snapshot(),
                contract: st.contract.address?,
                caller: providers.signer.as_ref()?.address(),
                gateway: providers.instance.clone()?,
                writer: providers.write_provider.clone()?,
            })
        }) else {
            return Ok(None);
        };

        st.operate = LaneState::InFlight;
        st.message = operation.progress(amount);
        Ok(Some(job))
    }

    async fn submit(
        job: &OperateJob,
        operation: Operation,
        amount: u64,
    ) -> Result<TxReceipt, ControllerError> {
        let input = job
            .gateway
            .encrypt_amount(job.contract, job.caller, amount)
            .await?;

        let tx = match operation {
            Operation::Deposit => job.writer.deposit(job.contract, job.caller, &input).await?,
            Operation::Withdraw => job.writer.withdraw(job.contract, job.caller, &input).await?,
            Operation::Transfer { to } => {
                job.writer
                    .transfer(job.contract, job.caller, to, &input)
                    .await?
            }
        };

        Ok(job.writer.wait_for_receipt(tx).await?)
    }

    fn finish_operate(
        &self,
        job: &OperateJob,
        operation: Operation,
        amount: u64,
        result: Result<TxReceipt, ControllerError>,
    ) -> Outcome {
        let mut st = self.state();
        if !st.network.is_current(&job.snapshot) {
            // the transaction may well be mined; only our view of it is stale
            warn!(?operation, ok = result.is_ok(), "Discarding stale operation result");
            return Outcome::Discarded;
        }

        match result {
            Ok(receipt) => {
                st.balance.invalidate();
                st.operate = LaneState::Succeeded;
                st.message = operation.success(amount);
                info!(
                    ?operation,
                    tx = %receipt.hash,
                    block = receipt.block_number,
                    "Operation confirmed"
                );
                Outcome::Succeeded
            }
            Err(e) => {
                error!(?operation, error = %e, "Operation failed");
                let reason = e.to_string();
                st.operate = LaneState::Failed(reason.clone());
                st.message = format!("{}: {reason}", operation.error_prefix());
                Outcome::Failed(reason)
            }
        }
    }
}
