use thiserror::Error;

use crate::keystore::KeyError;

/// Errors raised by the chain collaborators
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transaction {tx_hash} rejected with code {code} ({codespace}): {log}")]
    Rejected {
        tx_hash: String,
        codespace: String,
        code: u32,
        log: String,
    },

    /// The transaction may or may not have been included
    #[error("Transaction {tx_hash} not included within {timeout_ms}ms")]
    BroadcastTimeout { tx_hash: String, timeout_ms: u64 },

    /// The node may or may not have accepted the transaction
    #[error("Broadcast of {tx_hash} unconfirmed: {reason}")]
    BroadcastUnconfirmed { tx_hash: String, reason: String },

    #[error("Signing error: {0}")]
    Signing(#[from] KeyError),

    #[error("No signer available for {0}")]
    NoSigner(String),

    #[error("Invalid fee: {0}")]
    InvalidFee(String),

    #[error("Node reports chain id {actual} but the profile expects {expected}")]
    ChainIdMismatch { expected: String, actual: String },
}

/// Coarse reason a transaction was rejected by the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    InsufficientFunds,
    SequenceMismatch,
    SignatureRejected,
    AlreadyExists,
    NotFound,
    NotAllowed,
    Other,
}

// Cosmos SDK root codespace error codes
const SDK_CODESPACE: &str = "sdk";
const SDK_UNAUTHORIZED: u32 = 4;
const SDK_INSUFFICIENT_FUNDS: u32 = 5;
const SDK_INVALID_PUBKEY: u32 = 8;
const SDK_WRONG_SEQUENCE: u32 = 32;

impl RejectionKind {
    /// Classify a rejection from its codespace, code and log
    pub fn classify(codespace: &str, code: u32, log: &str) -> Self {
        let log = log.to_lowercase();

        if codespace == SDK_CODESPACE || codespace.is_empty() {
            match code {
                SDK_INSUFFICIENT_FUNDS => return RejectionKind::InsufficientFunds,
                SDK_WRONG_SEQUENCE => return RejectionKind::SequenceMismatch,
                SDK_UNAUTHORIZED | SDK_INVALID_PUBKEY
                    if log.contains("signature") || log.contains("pubkey") =>
                {
                    return RejectionKind::SignatureRejected
                }
                _ => {}
            }
        }

        if log.contains("insufficient funds") {
            RejectionKind::InsufficientFunds
        } else if log.contains("account sequence mismatch") || log.contains("incorrect account sequence") {
            RejectionKind::SequenceMismatch
        } else if log.contains("signature verification failed") || log.contains("does not match signer") {
            RejectionKind::SignatureRejected
        } else if log.contains("already") {
            RejectionKind::AlreadyExists
        } else if log.contains("not allowed") || log.contains("unknown plugin") || log.contains("invalid plugin") {
            RejectionKind::NotAllowed
        } else if log.contains("not found") || log.contains("not registered") {
            RejectionKind::NotFound
        } else {
            RejectionKind::Other
        }
    }
}

impl ChainError {
    /// Whether the outcome of the failed call is unknown rather than negative
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            ChainError::BroadcastTimeout { .. } | ChainError::BroadcastUnconfirmed { .. }
        )
    }
}
