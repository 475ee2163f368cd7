//! Services for the wealth server
//!
//! The FHE gateway, the decryption signature cache, readiness gates and the
//! balance controller that ties them to the contract.

pub mod contract;
pub mod controller;
pub mod gateway;
pub mod readiness;
pub mod signature;

pub use contract::{CipherWealthContract, ContractError, WalletError, WalletSigner};
pub use controller::{BalanceController, BalanceView, LaneState, Operation, Outcome, Providers};
pub use gateway::{EncryptionGateway, FhevmInstance, GatewayError};
pub use readiness::{GateInputs, Gates};
pub use signature::{DecryptionSignatureCache, InMemoryStorage, JsonFileStorage, StringStorage};
