//! Type definitions for the wallet gateway
//!
//! On-chain primitives (addresses, ciphertext handles), the contract ABI,
//! decryption signatures, and all request/response types of the HTTP API.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseHexError {
    #[error("missing 0x prefix")]
    MissingPrefix,
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Decode a `0x`-prefixed hex string into a fixed-size byte array
fn decode_prefixed<const N: usize>(s: &str) -> Result<[u8; N], ParseHexError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or(ParseHexError::MissingPrefix)?;
    let bytes = hex::decode(digits).map_err(|e| ParseHexError::InvalidHex(e.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseHexError::InvalidLength { expected: N, actual })
}

/// Serialize/deserialize fixed-size values as `0x`-prefixed hex strings
macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                self.to_string().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ==================== On-chain Primitives ====================

/// 20-byte account or contract address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<20>(s).map(Address)
    }
}

hex_serde!(Address);

/// Opaque 32-byte reference to a ciphertext held by the FHE coprocessor.
///
/// The all-zero handle is the "uninitialized" sentinel the contract returns
/// for accounts that never received a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptedHandle(pub [u8; 32]);

impl EncryptedHandle {
    pub const ZERO: EncryptedHandle = EncryptedHandle([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for EncryptedHandle {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<32>(s).map(EncryptedHandle)
    }
}

hex_serde!(EncryptedHandle);

/// Transaction hash returned when a transaction is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<32>(s).map(TxHash)
    }
}

hex_serde!(TxHash);

/// Events emitted by the encrypted balance contract. Amounts are never
/// part of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum ContractEvent {
    Deposit { user: Address },
    Withdrawal { user: Address },
}

/// Receipt of a mined transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub hash: TxHash,
    pub block_number: u64,
    /// 1 = success, 0 = reverted
    pub status: u8,
    pub events: Vec<ContractEvent>,
}

/// Ciphertext handles plus the proof that they were correctly formed,
/// bound to one (contract, user) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedInput {
    pub handles: Vec<EncryptedHandle>,
    #[serde(with = "hex_bytes")]
    pub input_proof: Vec<u8>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        format!("0x{}", hex::encode(data)).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

// ==================== Contract ABI ====================

/// One parameter of an ABI function or event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub internal_type: Option<String>,
    #[serde(default)]
    pub indexed: Option<bool>,
}

/// One ABI entry (function or event)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    #[serde(default)]
    pub state_mutability: Option<String>,
    #[serde(default)]
    pub anonymous: Option<bool>,
}

/// Contract ABI as emitted by the Solidity toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractAbi(pub Vec<AbiItem>);

const CIPHER_WEALTH_ABI: &str = include_str!("../../abi/CipherWealth.json");

impl ContractAbi {
    /// ABI of the CipherWealth contract bundled with this crate
    pub fn cipher_wealth() -> Result<Self, serde_json::Error> {
        serde_json::from_str(CIPHER_WEALTH_ABI)
    }

    pub fn function(&self, name: &str) -> Option<&AbiItem> {
        self.0
            .iter()
            .find(|item| item.kind == "function" && item.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&AbiItem> {
        self.0
            .iter()
            .find(|item| item.kind == "event" && item.name == name)
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|item| item.kind == "function")
            .map(|item| item.name.as_str())
            .collect()
    }
}

/// Deployment of the contract on the currently connected chain.
///
/// `address == None` means "not deployed on this chain".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainContractInfo {
    #[serde(skip)]
    pub abi: Arc<ContractAbi>,
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
    pub chain_name: Option<String>,
}

impl ChainContractInfo {
    pub fn is_deployed(&self) -> bool {
        self.address.map(|a| !a.is_zero()).unwrap_or(false)
    }
}

// ==================== Decryption Authorization ====================

/// Time-bounded credential authorizing `user_address` to decrypt handles of
/// `contract_addresses` off-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    /// Ephemeral private key (hex), re-encryption target of the gateway
    pub private_key: String,
    /// Ephemeral public key (hex)
    pub public_key: String,
    /// Wallet signature over the authorization (hex)
    pub signature: String,
    /// Contracts the signature covers, sorted ascending
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    /// Unix seconds
    pub start_timestamp: i64,
    pub duration_days: u32,
}

impl DecryptionSignature {
    pub const SECONDS_PER_DAY: i64 = 86_400;

    /// Unix second at which the signature stops being valid; `None` when
    /// the window does not fit in an `i64`
    pub fn expires_at(&self) -> Option<i64> {
        i64::from(self.duration_days)
            .checked_mul(Self::SECONDS_PER_DAY)
            .and_then(|window| self.start_timestamp.checked_add(window))
    }

    /// An out-of-range window counts as expired
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.expires_at().map(|end| now < end).unwrap_or(false)
    }

    /// Whether this signature was issued for exactly this user and contract set
    pub fn covers(&self, user: &Address, contracts: &[Address]) -> bool {
        let mut sorted = contracts.to_vec();
        sorted.sort();
        sorted.dedup();
        self.user_address == *user && self.contract_addresses == sorted
    }
}

/// Typed-data payload the wallet signs to authorize user decryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionAuthorization {
    pub chain_id: u64,
    pub public_key: String,
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: i64,
    pub duration_days: u32,
}

// ==================== API Types ====================

/// Error codes returned by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request
    InvalidInput,
    /// Wallet not connected or account unknown
    WalletUnavailable,
    /// Contract not deployed on the connected chain
    NotDeployed,
    /// Contract or network call failed
    ContractError,
    /// Internal server error
    InternalError,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub chain_id: u64,
    pub account: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchChainRequest {
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchAccountRequest {
    pub account: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub to: Address,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceOfResponse {
    pub user: Address,
    pub handle: EncryptedHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsResponse {
    pub accounts: Vec<Address>,
}

/// Server health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server status with more details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub chain_id: Option<u64>,
    pub contract: Option<Address>,
    pub protocol_id: Option<u64>,
    pub supported_functions: Vec<String>,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_and_parse() {
        let addr = Address([0xab; 20]);
        let text = addr.to_string();
        assert_eq!(text, format!("0x{}", "ab".repeat(20)));
        assert_eq!(text.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_address_parse_errors() {
        assert_eq!(
            "abcd".parse::<Address>(),
            Err(ParseHexError::MissingPrefix)
        );
        assert_eq!(
            "0xabcd".parse::<Address>(),
            Err(ParseHexError::InvalidLength {
                expected: 20,
                actual: 2
            })
        );
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(ParseHexError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_zero_sentinels() {
        assert!(Address::ZERO.is_zero());
        assert!(EncryptedHandle::ZERO.is_zero());
        assert!(!EncryptedHandle([1u8; 32]).is_zero());
        assert_eq!(
            EncryptedHandle::ZERO.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_handle_serializes_as_hex_string() {
        let handle = EncryptedHandle([7u8; 32]);
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "07".repeat(32)));
        let back: EncryptedHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, handle);
    }

    #[test]
    fn test_bundled_abi_surface() {
        let abi = ContractAbi::cipher_wealth().unwrap();
        for name in [
            "deposit",
            "withdraw",
            "transfer",
            "getBalance",
            "getBalanceOf",
            "protocolId",
        ] {
            assert!(abi.function(name).is_some(), "missing function {name}");
        }

        let deposit_event = abi.event("Deposit").unwrap();
        assert_eq!(deposit_event.inputs.len(), 1);
        assert_eq!(deposit_event.inputs[0].indexed, Some(true));
        assert!(abi.event("Withdrawal").is_some());
        assert_eq!(
            abi.function("transfer").unwrap().inputs[0].kind,
            "address"
        );
    }

    #[test]
    fn test_signature_validity_window() {
        let sig = DecryptionSignature {
            private_key: String::new(),
            public_key: String::new(),
            signature: String::new(),
            contract_addresses: vec![Address([1; 20])],
            user_address: Address([2; 20]),
            start_timestamp: 1_000,
            duration_days: 1,
        };

        assert_eq!(sig.expires_at(), Some(1_000 + 86_400));
        assert!(sig.is_valid_at(1_000));
        assert!(sig.is_valid_at(86_399 + 1_000));
        assert!(!sig.is_valid_at(86_400 + 1_000));
    }

    #[test]
    fn test_out_of_range_window_is_expired() {
        let sig = DecryptionSignature {
            private_key: String::new(),
            public_key: String::new(),
            signature: String::new(),
            contract_addresses: vec![Address([1; 20])],
            user_address: Address([2; 20]),
            start_timestamp: i64::MAX - 10,
            duration_days: 365,
        };

        assert_eq!(sig.expires_at(), None);
        assert!(!sig.is_valid_at(0));
        assert!(!sig.is_valid_at(i64::MAX));
    }

    #[test]
    fn test_signature_covers_exact_set_only() {
        let a = Address([1; 20]);
        let b = Address([3; 20]);
        let user = Address([2; 20]);
        let sig = DecryptionSignature {
            private_key: String::new(),
            public_key: String::new(),
            signature: String::new(),
            contract_addresses: vec![a, b],
            user_address: user,
            start_timestamp: 0,
            duration_days: 1,
        };

        assert!(sig.covers(&user, &[b, a]));
        assert!(!sig.covers(&user, &[a]));
        assert!(!sig.covers(&Address([9; 20]), &[a, b]));
    }
}
