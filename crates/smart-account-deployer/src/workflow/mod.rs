// Smart-account activation workflow
//
// Derive -> Fund -> Activate -> RegisterPlugin -> RotateKey -> UnregisterPlugin.
// Every transaction follows the same three phases: fetch a fresh sign context,
// sign, broadcast and wait for inclusion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::account::{PluginRegistration, SmartAccountDescriptor, SmartAccountExecuteMsg};
use crate::chain::{
    messages, tx_hash, AddressDeriver, ChainClient, ChainError, Coin, Fee, Signer, TxResult,
};
use crate::config::{ChainEndpointProfile, GasLimits};
use crate::metrics::SharedMetrics;

pub mod driver;
pub mod error;
pub mod journal;

#[cfg(test)]
pub(crate) mod test_utils;

pub use driver::{DriverOutcome, PluginPlan, WorkflowDriver, WorkflowPlan};
pub use error::{StepTarget, WorkflowError};
pub use journal::{Journal, JournalEntry, PendingStep, TxAttempt};

/// One operation of the workflow, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Derive,
    Fund,
    Activate,
    RegisterPlugin,
    RotateKey,
    UnregisterPlugin,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Derive,
        Step::Fund,
        Step::Activate,
        Step::RegisterPlugin,
        Step::RotateKey,
        Step::UnregisterPlugin,
    ];

    pub fn next(self) -> Option<Step> {
        let index = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(index + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Derive => "derive",
            Step::Fund => "fund",
            Step::Activate => "activate",
            Step::RegisterPlugin => "register_plugin",
            Step::RotateKey => "rotate_key",
            Step::UnregisterPlugin => "unregister_plugin",
        }
    }

    /// Steps signed by the smart account itself
    pub fn signs_as_smart_account(self) -> bool {
        matches!(self, Step::RegisterPlugin | Step::UnregisterPlugin)
    }

    /// State reached once this step is confirmed
    pub fn reaches(self) -> WorkflowState {
        match self {
            Step::Derive => WorkflowState::Derived,
            Step::Fund => WorkflowState::Funded,
            Step::Activate => WorkflowState::Activated,
            Step::RegisterPlugin => WorkflowState::PluginRegistered,
            Step::RotateKey => WorkflowState::KeyRotated,
            Step::UnregisterPlugin => WorkflowState::PluginUnregistered,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a smart account in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Derived,
    Funded,
    Activated,
    PluginRegistered,
    KeyRotated,
    PluginUnregistered,
}

impl WorkflowState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Derived => "derived",
            WorkflowState::Funded => "funded",
            WorkflowState::Activated => "activated",
            WorkflowState::PluginRegistered => "plugin_registered",
            WorkflowState::KeyRotated => "key_rotated",
            WorkflowState::PluginUnregistered => "plugin_unregistered",
        }
    }

    /// Step whose completion leads to this state
    pub fn step(self) -> Step {
        match self {
            WorkflowState::Derived => Step::Derive,
            WorkflowState::Funded => Step::Fund,
            WorkflowState::Activated => Step::Activate,
            WorkflowState::PluginRegistered => Step::RegisterPlugin,
            WorkflowState::KeyRotated => Step::RotateKey,
            WorkflowState::PluginUnregistered => Step::UnregisterPlugin,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Step::ALL
            .iter()
            .map(|step| step.reaches())
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown workflow state {:?} (expected one of derived, funded, activated, plugin_registered, key_rotated, plugin_unregistered)",
                    s
                )
            })
    }
}

/// A signing key acting for one address
#[derive(Clone)]
pub struct SignerIdentity {
    address: String,
    public_key: Vec<u8>,
    signer: Arc<dyn Signer>,
}

impl SignerIdentity {
    pub fn new(address: &str, public_key: Vec<u8>, signer: Arc<dyn Signer>) -> Self {
        Self {
            address: address.to_string(),
            public_key,
            signer,
        }
    }

    /// Identity of the signer's first account
    pub async fn primary(signer: Arc<dyn Signer>) -> Result<Self, WorkflowError> {
        let accounts = signer.accounts().await.map_err(|source| WorkflowError::Chain {
            step: Step::Derive,
            source,
        })?;
        let account = accounts.into_iter().next().ok_or_else(|| WorkflowError::Chain {
            step: Step::Derive,
            source: ChainError::NoSigner("signer holds no accounts".to_string()),
        })?;

        Ok(Self::new(&account.address, account.public_key, signer))
    }

    /// The same key signing on behalf of `address`
    pub fn acting_for(&self, address: &str) -> Self {
        Self {
            address: address.to_string(),
            public_key: self.public_key.clone(),
            signer: self.signer.clone(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl fmt::Debug for SignerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerIdentity")
            .field("address", &self.address)
            .field("public_key", &hex::encode(&self.public_key))
            .finish()
    }
}

/// Chain handles and signing identities the operations run with.
///
/// Replaced, never mutated: rotating the smart account's key yields a new
/// context carrying the new identity.
#[derive(Clone)]
pub struct WorkflowContext {
    chain: Arc<dyn ChainClient>,
    deriver: Arc<dyn AddressDeriver>,
    funder: SignerIdentity,
    recoverer: SignerIdentity,
    smart_account: Option<SignerIdentity>,
}

impl WorkflowContext {
    pub fn new(chain: Arc<dyn ChainClient>, deriver: Arc<dyn AddressDeriver>, funder: SignerIdentity) -> Self {
        Self {
            chain,
            deriver,
            recoverer: funder.clone(),
            funder,
            smart_account: None,
        }
    }

    /// Identity that submits recovery messages (defaults to the funder)
    pub fn with_recoverer(self, recoverer: SignerIdentity) -> Self {
        Self { recoverer, ..self }
    }

    pub fn with_smart_account(self, identity: SignerIdentity) -> Self {
        Self {
            smart_account: Some(identity),
            ..self
        }
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn funder(&self) -> &SignerIdentity {
        &self.funder
    }

    pub fn recoverer(&self) -> &SignerIdentity {
        &self.recoverer
    }

    pub fn smart_account(&self) -> Option<&SignerIdentity> {
        self.smart_account.as_ref()
    }

    fn smart_account_for(&self, step: Step, address: &str) -> Result<&SignerIdentity, WorkflowError> {
        match &self.smart_account {
            Some(identity) if identity.address == address => Ok(identity),
            Some(identity) => Err(WorkflowError::Precondition {
                step,
                reason: format!(
                    "context signs for {} but the step targets {}",
                    identity.address, address
                ),
            }),
            None => Err(WorkflowError::Precondition {
                step,
                reason: "no smart-account identity in context".to_string(),
            }),
        }
    }
}

impl fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("funder", &self.funder)
            .field("recoverer", &self.recoverer)
            .field("smart_account", &self.smart_account)
            .finish()
    }
}

/// A signed transaction whose hash is known before it is broadcast
#[derive(Clone)]
pub struct SignedStep {
    pub step: Step,
    pub target: StepTarget,
    pub tx_hash: String,
    /// Account whose sequence the transaction consumes, and that sequence
    pub signer_address: String,
    pub sequence: u64,
    tx_bytes: Vec<u8>,
}

impl SignedStep {
    pub fn attempt(&self) -> TxAttempt {
        TxAttempt::new(&self.tx_hash, &self.signer_address, self.sequence)
    }
}

impl fmt::Debug for SignedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedStep")
            .field("step", &self.step)
            .field("target", &self.target)
            .field("tx_hash", &self.tx_hash)
            .field("signer_address", &self.signer_address)
            .field("sequence", &self.sequence)
            .field("size", &self.tx_bytes.len())
            .finish()
    }
}

/// Executes the individual workflow operations
pub struct AccountActivationWorkflow {
    fee_denom: String,
    gas_price: String,
    gas: GasLimits,
    metrics: Option<SharedMetrics>,
}

impl AccountActivationWorkflow {
    pub fn new(profile: &ChainEndpointProfile, gas: GasLimits) -> Self {
        Self {
            fee_denom: profile.fee_denom.clone(),
            gas_price: profile.gas_price.clone(),
            gas,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Address the chain assigns to `descriptor`
    pub async fn derive_address(
        &self,
        ctx: &WorkflowContext,
        descriptor: &SmartAccountDescriptor,
    ) -> Result<String, WorkflowError> {
        let address = ctx
            .deriver
            .derive_smart_account_address(descriptor)
            .await
            .map_err(|source| WorkflowError::Chain {
                step: Step::Derive,
                source,
            })?;

        info!(
            "Derived smart account {} (code id {}, salt {:?})",
            address,
            descriptor.code_id,
            String::from_utf8_lossy(&descriptor.salt)
        );
        Ok(address)
    }

    /// Transfer `amount` from the funding identity to `to`
    pub async fn fund_account(
        &self,
        ctx: &WorkflowContext,
        to: &str,
        amount: u128,
        denom: &str,
    ) -> Result<TxResult, WorkflowError> {
        let signed = self.prepare_fund(ctx, to, amount, denom).await?;
        self.submit(ctx, signed).await
    }

    pub async fn prepare_fund(
        &self,
        ctx: &WorkflowContext,
        to: &str,
        amount: u128,
        denom: &str,
    ) -> Result<SignedStep, WorkflowError> {
        let from = ctx.funder.address.clone();
        let target = StepTarget {
            signer_address: from.clone(),
            account: to.to_string(),
            plugin: None,
        };
        let msg = messages::msg_send(&from, to, &[Coin::new(amount, denom)]);

        self.sign_step(
            ctx,
            &ctx.funder,
            Step::Fund,
            target,
            vec![msg],
            self.gas.send,
            "Send fund smart account",
        )
        .await
    }

    /// Activate the funded address with the descriptor it was derived from
    pub async fn activate_account(
        &self,
        ctx: &WorkflowContext,
        descriptor: &SmartAccountDescriptor,
        address: &str,
    ) -> Result<TxResult, WorkflowError> {
        let signed = self.prepare_activate(ctx, descriptor, address).await?;
        self.submit(ctx, signed).await
    }

    pub async fn prepare_activate(
        &self,
        ctx: &WorkflowContext,
        descriptor: &SmartAccountDescriptor,
        address: &str,
    ) -> Result<SignedStep, WorkflowError> {
        let derived = self.derive_address(ctx, descriptor).await?;
        if derived != address {
            return Err(WorkflowError::ActivationRejected {
                address: address.to_string(),
                reason: format!("descriptor derives {}, not {}", derived, address),
            });
        }
        if descriptor.public_key != ctx.funder.public_key {
            return Err(WorkflowError::ActivationRejected {
                address: address.to_string(),
                reason: "descriptor public key is not held by the funding identity".to_string(),
            });
        }

        let target = StepTarget {
            signer_address: address.to_string(),
            account: address.to_string(),
            plugin: None,
        };
        let msg = messages::msg_activate_account(descriptor, address);

        // The funding key signs against the smart account's own account number
        // and sequence, which exist once the address holds funds.
        let identity = ctx.funder.acting_for(address);
        self.sign_step(
            ctx,
            &identity,
            Step::Activate,
            target,
            vec![msg],
            self.gas.activate,
            "activate smart account",
        )
        .await
    }

    /// Attach a plugin through a self-call of the smart account
    pub async fn register_plugin(
        &self,
        ctx: &WorkflowContext,
        account: &str,
        registration: &PluginRegistration,
    ) -> Result<TxResult, WorkflowError> {
        let signed = self.prepare_register_plugin(ctx, account, registration).await?;
        self.submit(ctx, signed).await
    }

    pub async fn prepare_register_plugin(
        &self,
        ctx: &WorkflowContext,
        account: &str,
        registration: &PluginRegistration,
    ) -> Result<SignedStep, WorkflowError> {
        let identity = ctx.smart_account_for(Step::RegisterPlugin, account)?;
        let target = StepTarget {
            signer_address: account.to_string(),
            account: account.to_string(),
            plugin: Some(registration.plugin_address.clone()),
        };
        let msg = messages::msg_execute_contract(
            account,
            account,
            &SmartAccountExecuteMsg::register(registration),
            &[],
        )
        .map_err(|source| WorkflowError::Chain {
            step: Step::RegisterPlugin,
            source,
        })?;

        self.sign_step(
            ctx,
            identity,
            Step::RegisterPlugin,
            target,
            vec![msg],
            self.gas.execute,
            "register plugin",
        )
        .await
    }

    /// Replace the account's authorised key, returning the context that signs with it
    pub async fn rotate_key(
        &self,
        ctx: &WorkflowContext,
        account: &str,
        new_identity: SignerIdentity,
        credentials: &str,
    ) -> Result<(WorkflowContext, TxResult), WorkflowError> {
        let (signed, new_identity) = self
            .prepare_rotate_key(ctx, account, new_identity, credentials)
            .await?;
        let result = self.submit(ctx, signed).await?;

        info!(
            "Smart account {} now signs with key {}",
            account,
            hex::encode(new_identity.public_key())
        );
        Ok((ctx.clone().with_smart_account(new_identity), result))
    }

    /// Sign the recovery message; also returns the identity to switch to once it is confirmed
    pub async fn prepare_rotate_key(
        &self,
        ctx: &WorkflowContext,
        account: &str,
        new_identity: SignerIdentity,
        credentials: &str,
    ) -> Result<(SignedStep, SignerIdentity), WorkflowError> {
        let new_identity = new_identity.acting_for(account);
        let creator = ctx.recoverer.address.clone();
        let target = StepTarget {
            signer_address: creator.clone(),
            account: account.to_string(),
            plugin: None,
        };
        let msg = messages::msg_recover(&creator, account, &new_identity.public_key, credentials);

        let signed = self
            .sign_step(
                ctx,
                &ctx.recoverer,
                Step::RotateKey,
                target,
                vec![msg],
                self.gas.recover,
                "recover smart account",
            )
            .await?;
        Ok((signed, new_identity))
    }

    /// Detach a plugin through a self-call of the smart account
    pub async fn unregister_plugin(
        &self,
        ctx: &WorkflowContext,
        account: &str,
        plugin_address: &str,
    ) -> Result<TxResult, WorkflowError> {
        let signed = self.prepare_unregister_plugin(ctx, account, plugin_address).await?;
        self.submit(ctx, signed).await
    }

    pub async fn prepare_unregister_plugin(
        &self,
        ctx: &WorkflowContext,
        account: &str,
        plugin_address: &str,
    ) -> Result<SignedStep, WorkflowError> {
        let identity = ctx.smart_account_for(Step::UnregisterPlugin, account)?;
        let target = StepTarget {
            signer_address: account.to_string(),
            account: account.to_string(),
            plugin: Some(plugin_address.to_string()),
        };
        let msg = messages::msg_execute_contract(
            account,
            account,
            &SmartAccountExecuteMsg::unregister(plugin_address),
            &[],
        )
        .map_err(|source| WorkflowError::Chain {
            step: Step::UnregisterPlugin,
            source,
        })?;

        self.sign_step(
            ctx,
            identity,
            Step::UnregisterPlugin,
            target,
            vec![msg],
            self.gas.execute,
            "unregister plugin",
        )
        .await
    }

    /// Broadcast a signed step and wait for its inclusion
    pub async fn submit(&self, ctx: &WorkflowContext, signed: SignedStep) -> Result<TxResult, WorkflowError> {
        let SignedStep {
            step,
            target,
            tx_hash,
            tx_bytes,
            ..
        } = signed;

        info!("Broadcasting {} for {} (tx {})", step, target.account, tx_hash);
        let started = Instant::now();

        match ctx.chain.broadcast(tx_bytes).await {
            Ok(result) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_success(step.as_str(), started.elapsed());
                }
                info!(
                    "{} confirmed for {} at height {} (gas used {})",
                    step, target.account, result.height, result.gas_used
                );
                Ok(result)
            }
            Err(e) => {
                let err = WorkflowError::classify(step, &target, e);
                if let Some(metrics) = &self.metrics {
                    if err.is_ambiguous() {
                        metrics.record_timeout(step.as_str());
                    } else {
                        metrics.record_failure(step.as_str(), err.reason());
                    }
                }
                if err.is_ambiguous() {
                    warn!("{} for {}: {}", step, target.account, err);
                } else {
                    error!("{} for {} failed: {}", step, target.account, err);
                }
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn sign_step(
        &self,
        ctx: &WorkflowContext,
        identity: &SignerIdentity,
        step: Step,
        target: StepTarget,
        messages: Vec<cosmos_sdk_proto::Any>,
        gas_limit: u64,
        memo: &str,
    ) -> Result<SignedStep, WorkflowError> {
        let context = ctx
            .chain
            .get_sign_context(&identity.address)
            .await
            .map_err(|e| WorkflowError::classify(step, &target, e))?;

        let fee = Fee::from_gas(gas_limit, &self.gas_price, &self.fee_denom)
            .map_err(|source| WorkflowError::Chain { step, source })?;

        let tx_bytes = identity
            .signer
            .sign(&identity.address, messages, &fee, memo, &context)
            .await
            .map_err(|e| WorkflowError::classify(step, &target, e))?;

        let tx_hash = tx_hash(&tx_bytes);
        debug!(
            "Signed {} as {} (acc {}, seq {}): {}",
            step, identity.address, context.account_number, context.sequence, tx_hash
        );

        Ok(SignedStep {
            step,
            target,
            tx_hash,
            signer_address: identity.address.clone(),
            sequence: context.sequence,
            tx_bytes,
        })
    }
}
