use thiserror::Error;

use super::Step;
use crate::chain::{ChainError, RejectionKind};
use crate::keystore::KeyError;

/// Failures of a workflow step, in the terms an operator acts on
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Insufficient funds on {address} during {step}: {log}")]
    InsufficientFunds { step: Step, address: String, log: String },

    #[error("Activation of {address} rejected: {reason}")]
    ActivationRejected { address: String, reason: String },

    #[error("Plugin {plugin} is already registered on {account}")]
    PluginAlreadyRegistered { account: String, plugin: String },

    #[error("Plugin {plugin} is not registered on {account}")]
    PluginNotRegistered { account: String, plugin: String },

    #[error("Plugin {plugin} is not known to the plugin manager of {account}: {reason}")]
    UnknownPlugin {
        account: String,
        plugin: String,
        reason: String,
    },

    /// Signed as the smart account with a key it no longer authorises
    #[error("Stale key for {account}: {reason}")]
    StaleKey { account: String, reason: String },

    /// Inclusion was not observed in time; the transaction may still land
    #[error("Broadcast of {tx_hash} timed out during {step} after {timeout_ms}ms; outcome unknown")]
    BroadcastTimeout {
        step: Step,
        tx_hash: String,
        timeout_ms: u64,
    },

    #[error("Sequence mismatch for {address} during {step}: {log}")]
    SequenceMismatch { step: Step, address: String, log: String },

    #[error("{step} failed: {source}")]
    Chain {
        step: Step,
        #[source]
        source: ChainError,
    },

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Cannot run {step}: {reason}")]
    Precondition { step: Step, reason: String },
}

impl From<std::io::Error> for WorkflowError {
    fn from(e: std::io::Error) -> Self {
        WorkflowError::Journal(e.to_string())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        WorkflowError::Journal(e.to_string())
    }
}

/// What a step acted on, used to phrase classified errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTarget {
    /// Account whose sequence the transaction consumes
    pub signer_address: String,
    /// Smart account the step concerns
    pub account: String,
    pub plugin: Option<String>,
}

impl WorkflowError {
    /// Map a chain failure of `step` onto the workflow taxonomy
    pub fn classify(step: Step, target: &StepTarget, error: ChainError) -> Self {
        let plugin = || target.plugin.clone().unwrap_or_default();

        match error {
            ChainError::BroadcastTimeout { tx_hash, timeout_ms } => WorkflowError::BroadcastTimeout {
                step,
                tx_hash,
                timeout_ms,
            },
            ChainError::AccountNotFound(address) => match step {
                Step::Fund => WorkflowError::InsufficientFunds {
                    step,
                    address,
                    log: "account does not exist".to_string(),
                },
                Step::Activate => WorkflowError::ActivationRejected {
                    address,
                    reason: "account has not been funded".to_string(),
                },
                _ => WorkflowError::Chain {
                    step,
                    source: ChainError::AccountNotFound(address),
                },
            },
            ChainError::Rejected {
                tx_hash,
                codespace,
                code,
                log,
            } => {
                let kind = RejectionKind::classify(&codespace, code, &log);
                match (kind, step) {
                    (RejectionKind::InsufficientFunds, _) => WorkflowError::InsufficientFunds {
                        step,
                        address: target.signer_address.clone(),
                        log,
                    },
                    (RejectionKind::SequenceMismatch, _) => WorkflowError::SequenceMismatch {
                        step,
                        address: target.signer_address.clone(),
                        log,
                    },
                    (_, Step::Activate) => WorkflowError::ActivationRejected {
                        address: target.account.clone(),
                        reason: log,
                    },
                    (RejectionKind::SignatureRejected, s) if s.signs_as_smart_account() => {
                        WorkflowError::StaleKey {
                            account: target.account.clone(),
                            reason: log,
                        }
                    }
                    (RejectionKind::AlreadyExists, Step::RegisterPlugin) => {
                        WorkflowError::PluginAlreadyRegistered {
                            account: target.account.clone(),
                            plugin: plugin(),
                        }
                    }
                    (RejectionKind::NotAllowed, Step::RegisterPlugin)
                    | (RejectionKind::NotFound, Step::RegisterPlugin) => WorkflowError::UnknownPlugin {
                        account: target.account.clone(),
                        plugin: plugin(),
                        reason: log,
                    },
                    (RejectionKind::NotFound, Step::UnregisterPlugin) => {
                        WorkflowError::PluginNotRegistered {
                            account: target.account.clone(),
                            plugin: plugin(),
                        }
                    }
                    _ => WorkflowError::Chain {
                        step,
                        source: ChainError::Rejected {
                            tx_hash,
                            codespace,
                            code,
                            log,
                        },
                    },
                }
            }
            other => WorkflowError::Chain { step, source: other },
        }
    }

    /// Whether the failed step may in fact have been applied on chain
    pub fn is_ambiguous(&self) -> bool {
        match self {
            WorkflowError::BroadcastTimeout { .. } => true,
            WorkflowError::Chain { source, .. } => source.is_ambiguous(),
            _ => false,
        }
    }

    /// Short label for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            WorkflowError::InsufficientFunds { .. } => "insufficient_funds",
            WorkflowError::ActivationRejected { .. } => "activation_rejected",
            WorkflowError::PluginAlreadyRegistered { .. } => "plugin_already_registered",
            WorkflowError::PluginNotRegistered { .. } => "plugin_not_registered",
            WorkflowError::UnknownPlugin { .. } => "unknown_plugin",
            WorkflowError::StaleKey { .. } => "stale_key",
            WorkflowError::BroadcastTimeout { .. } => "broadcast_timeout",
            WorkflowError::SequenceMismatch { .. } => "sequence_mismatch",
            WorkflowError::Chain { .. } => "chain",
            WorkflowError::Key(_) => "key",
            WorkflowError::Journal(_) => "journal",
            WorkflowError::Precondition { .. } => "precondition",
        }
    }
}
