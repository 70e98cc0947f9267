// Pyxis deployer library
// Contract upload, plugin-manager setup and the smart-account activation workflow

pub mod account;
pub mod chain;
pub mod config;
pub mod deploy;
pub mod keystore;
pub mod metrics;
pub mod workflow;

// Re-export commonly used types for convenience
pub use account::{PluginRegistration, RecoveryConfig, SmartAccountDescriptor};
pub use chain::{AddressDeriver, ChainClient, ChainError, LocalSigner, RpcChainClient, Signer, SignContext, TxResult};
pub use config::{ChainEndpointProfile, DeployerConfig};
pub use deploy::{ContractRecord, ContractRegistry, DeployError};
pub use keystore::{CosmosKey, KeyError, KeyManager, KeyManagerConfig};
pub use metrics::DeployerMetrics;
pub use workflow::{
    AccountActivationWorkflow, Journal, SignerIdentity, Step, WorkflowContext, WorkflowDriver,
    WorkflowError, WorkflowPlan, WorkflowState,
};
