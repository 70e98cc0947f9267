// Collaborator interfaces the deployment workflow is written against,
// plus the concrete Tendermint RPC and local-key implementations

use async_trait::async_trait;
use cosmos_sdk_proto::Any;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod error;
pub mod messages;
pub mod rpc;
pub mod signer;

pub use error::{ChainError, RejectionKind};
pub use rpc::RpcChainClient;
pub use signer::LocalSigner;

use crate::account::SmartAccountDescriptor;

/// Token amount in a single denomination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// Transaction fee: coins paid for a gas limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fee {
    pub amount: Vec<Coin>,
    pub gas_limit: u64,
}

impl Fee {
    /// Fee for `gas_limit` at a decimal `gas_price` (e.g. "0.025"), rounded up
    pub fn from_gas(gas_limit: u64, gas_price: &str, denom: &str) -> Result<Self, ChainError> {
        let (whole, fraction) = match gas_price.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (gas_price, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(ChainError::InvalidFee("empty gas price".to_string()));
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(ChainError::InvalidFee(format!("invalid gas price {:?}", gas_price)));
        }

        // Exact fixed-point arithmetic: price = digits / 10^scale
        let digits: u128 = format!("{}{}", whole, fraction)
            .parse()
            .map_err(|_| ChainError::InvalidFee(format!("invalid gas price {:?}", gas_price)))?;
        let scale = 10u128
            .checked_pow(fraction.len() as u32)
            .ok_or_else(|| ChainError::InvalidFee(format!("gas price {:?} too precise", gas_price)))?;

        let amount = digits
            .checked_mul(gas_limit as u128)
            .and_then(|numerator| numerator.checked_add(scale - 1))
            .map(|numerator| numerator / scale)
            .ok_or_else(|| ChainError::InvalidFee(format!("fee for gas price {:?} overflows", gas_price)))?;

        Ok(Self {
            amount: vec![Coin::new(amount, denom)],
            gas_limit,
        })
    }
}

/// An account a signer can produce signatures for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    pub address: String,
    pub public_key: Vec<u8>,
}

/// Data needed to produce a valid signature for an account at this point in chain history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignContext {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
}

/// A transaction event with its decoded attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    pub event_type: String,
    pub attributes: Vec<(String, String)>,
}

/// Outcome of an included transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub tx_hash: String,
    pub height: u64,
    pub code: u32,
    pub codespace: String,
    pub gas_used: u64,
    pub raw_log: String,
    pub events: Vec<TxEvent>,
}

impl TxResult {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Turn a failed delivery into a rejection error
    pub fn into_result(self) -> Result<TxResult, ChainError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ChainError::Rejected {
                tx_hash: self.tx_hash,
                codespace: self.codespace,
                code: self.code,
                log: self.raw_log,
            })
        }
    }

    /// All events of the given type
    pub fn events_of<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a TxEvent> + 'a {
        self.events.iter().filter(move |e| e.event_type == event_type)
    }

    /// First value of `key` among events of `event_type`
    pub fn attribute(&self, event_type: &str, key: &str) -> Option<&str> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .flat_map(|e| e.attributes.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Options for contract instantiation
#[derive(Debug, Clone, Default)]
pub struct InstantiateOptions {
    pub admin: Option<String>,
    pub memo: String,
}

#[derive(Debug, Clone)]
pub struct InstantiateResult {
    pub contract_address: String,
    pub tx: TxResult,
}

/// Hash under which the chain indexes a signed transaction
pub fn tx_hash(tx_bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx_bytes))
}

/// Wallet side: knows keys, produces signed transaction bytes
#[async_trait]
pub trait Signer: Send + Sync {
    /// Accounts whose keys this signer holds
    async fn accounts(&self) -> Result<Vec<AccountData>, ChainError>;

    /// Sign `messages` on behalf of `signer_address`, returning encoded `TxRaw` bytes
    async fn sign(
        &self,
        signer_address: &str,
        messages: Vec<Any>,
        fee: &Fee,
        memo: &str,
        context: &SignContext,
    ) -> Result<Vec<u8>, ChainError>;
}

/// Node side: queries, broadcasting and the signing conveniences of a client SDK
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id reported by the node
    async fn chain_id(&self) -> Result<String, ChainError>;

    /// Fresh account number and sequence for `address`
    async fn get_sign_context(&self, address: &str) -> Result<SignContext, ChainError>;

    /// Broadcast signed bytes and wait for inclusion
    async fn broadcast(&self, tx_bytes: Vec<u8>) -> Result<TxResult, ChainError>;

    /// Look up a transaction by hash; `None` if the chain has not included it
    async fn get_tx(&self, tx_hash: &str) -> Result<Option<TxResult>, ChainError>;

    async fn send_tokens(
        &self,
        from: &str,
        to: &str,
        amount: u128,
        denom: &str,
    ) -> Result<TxResult, ChainError>;

    async fn instantiate_contract(
        &self,
        sender: &str,
        code_id: u64,
        init_payload: &serde_json::Value,
        label: &str,
        funds: Vec<Coin>,
        options: InstantiateOptions,
    ) -> Result<InstantiateResult, ChainError>;

    /// Execute a contract with a JSON message
    async fn execute_contract(
        &self,
        sender: &str,
        contract: &str,
        msg: &serde_json::Value,
        funds: Vec<Coin>,
    ) -> Result<TxResult, ChainError>;

    /// Upload one or more wasm modules in a single transaction
    async fn store_code(&self, sender: &str, wasm_modules: Vec<Vec<u8>>) -> Result<TxResult, ChainError>;

    /// Lower-hex sha256 of the wasm stored under `code_id`
    async fn code_checksum(&self, code_id: u64) -> Result<String, ChainError>;
}

/// Smart-account address derivation, as enforced by the chain
#[async_trait]
pub trait AddressDeriver: Send + Sync {
    async fn derive_smart_account_address(
        &self,
        descriptor: &SmartAccountDescriptor,
    ) -> Result<String, ChainError>;
}
