// Runs the workflow steps in order, journaling progress so an interrupted
// run resumes where it stopped without resubmitting confirmed transactions

use tracing::{debug, info, warn};

use super::journal::{Journal, JournalEntry, TxAttempt};
use super::{
    AccountActivationWorkflow, SignedStep, SignerIdentity, Step, WorkflowContext, WorkflowError,
    WorkflowState,
};
use crate::account::{PluginRegistration, RecoveryConfig, SmartAccountDescriptor};
use crate::chain::{ChainError, TxResult};

/// Recovery plugin attached between activation and key rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginPlan {
    pub plugin_address: String,
    pub checksum: String,
    /// Address allowed to submit recovery messages
    pub recover_address: String,
}

impl PluginPlan {
    pub fn registration(&self, smart_account_address: &str) -> PluginRegistration {
        PluginRegistration {
            plugin_address: self.plugin_address.clone(),
            checksum: self.checksum.clone(),
            config_payload: RecoveryConfig {
                smart_account_address: smart_account_address.to_string(),
                recover_address: self.recover_address.clone(),
            }
            .to_payload(),
        }
    }
}

/// Everything one account needs to go through the workflow
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    pub descriptor: SmartAccountDescriptor,
    pub fund_amount: u128,
    pub fund_denom: String,
    pub plugin: PluginPlan,
    /// Key the smart account is rotated to
    pub rotated: SignerIdentity,
    pub credentials: String,
    /// Stop once this state is reached
    pub until: WorkflowState,
}

#[derive(Debug, Clone)]
pub struct DriverOutcome {
    pub address: String,
    pub state: WorkflowState,
    /// Context as it stands after the run (rotated identity included)
    pub context: WorkflowContext,
}

pub struct WorkflowDriver {
    workflow: AccountActivationWorkflow,
    journal: Journal,
}

impl WorkflowDriver {
    pub fn new(workflow: AccountActivationWorkflow, journal: Journal) -> Self {
        Self { workflow, journal }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Drive one account from its journaled position up to `plan.until`
    pub async fn run(&self, ctx: WorkflowContext, plan: &WorkflowPlan) -> Result<DriverOutcome, WorkflowError> {
        let address = self.workflow.derive_address(&ctx, &plan.descriptor).await?;

        let mut entry = match self.journal.load(&address)? {
            Some(entry) if entry.descriptor != plan.descriptor => {
                return Err(WorkflowError::Precondition {
                    step: Step::Derive,
                    reason: format!("journal for {} was written for a different descriptor", address),
                })
            }
            Some(entry) => {
                info!(
                    "Resuming {} after {}",
                    address,
                    entry.last_completed.map(|s| s.as_str()).unwrap_or("nothing")
                );
                entry
            }
            None => JournalEntry::new(&address, plan.descriptor.clone()),
        };

        if entry.last_completed.is_none() {
            entry.mark_completed(Step::Derive, None, None);
            self.journal.save(&entry)?;
        }

        let mut ctx = self.context_for(ctx, &entry, plan);

        if entry.pending.is_some() {
            ctx = self.resolve_pending(ctx, &mut entry, plan).await?;
        }

        while let Some(step) = entry.next_step() {
            if step.reaches() > plan.until {
                break;
            }
            ctx = self.run_step(ctx, &mut entry, plan, step).await?;
        }

        let state = entry
            .last_completed
            .map(Step::reaches)
            .unwrap_or(WorkflowState::Derived);
        info!("Smart account {} is {}", address, state);

        Ok(DriverOutcome {
            address,
            state,
            context: ctx,
        })
    }

    fn context_for(&self, ctx: WorkflowContext, entry: &JournalEntry, plan: &WorkflowPlan) -> WorkflowContext {
        let address = &entry.smart_account_address;
        let identity = if entry.last_completed >= Some(Step::RotateKey) {
            plan.rotated.acting_for(address)
        } else {
            ctx.funder().acting_for(address)
        };
        ctx.with_smart_account(identity)
    }

    /// Settle attempts whose outcome the last run never observed
    async fn resolve_pending(
        &self,
        ctx: WorkflowContext,
        entry: &mut JournalEntry,
        plan: &WorkflowPlan,
    ) -> Result<WorkflowContext, WorkflowError> {
        let Some(pending) = entry.pending.clone() else {
            return Ok(ctx);
        };

        if let Some(result) = self.find_included(&ctx, pending.step, &pending.attempts).await? {
            return self.settle(ctx, entry, plan, pending.step, result);
        }

        // Still tracked: the next attempt checks them again before it is broadcast
        warn!(
            "{} tx(s) {} not found on chain; the step will be signed again",
            pending.step,
            pending.hashes().collect::<Vec<_>>().join(", ")
        );
        Ok(ctx)
    }

    /// First included transaction among `attempts`, preferring a successful one
    async fn find_included(
        &self,
        ctx: &WorkflowContext,
        step: Step,
        attempts: &[TxAttempt],
    ) -> Result<Option<TxResult>, WorkflowError> {
        let mut failed = None;
        for attempt in attempts {
            let lookup = ctx
                .chain()
                .get_tx(&attempt.tx_hash)
                .await
                .map_err(|source| WorkflowError::Chain { step, source })?;

            match lookup {
                Some(result) if result.is_success() => return Ok(Some(result)),
                Some(result) => failed = Some(result),
                None => debug!("{} tx {} not found", step, attempt.tx_hash),
            }
        }
        Ok(failed)
    }

    /// Record the on-chain outcome of an earlier attempt of `step`
    fn settle(
        &self,
        ctx: WorkflowContext,
        entry: &mut JournalEntry,
        plan: &WorkflowPlan,
        step: Step,
        result: TxResult,
    ) -> Result<WorkflowContext, WorkflowError> {
        if result.is_success() {
            info!(
                "{} tx {} was included at height {}; not resubmitting",
                step, result.tx_hash, result.height
            );
            entry.mark_completed(step, Some(&result.tx_hash), Some(result.height));
            self.journal.save(entry)?;
            return Ok(self.after_step(ctx, entry, plan, step));
        }

        warn!(
            "{} tx {} was included but failed (code {}): {}",
            step, result.tx_hash, result.code, result.raw_log
        );
        entry.clear_pending();
        self.journal.save(entry)?;

        let target = self.target_for(entry, plan, step, &ctx);
        Err(WorkflowError::classify(
            step,
            &target,
            ChainError::Rejected {
                tx_hash: result.tx_hash,
                codespace: result.codespace,
                code: result.code,
                log: result.raw_log,
            },
        ))
    }

    async fn run_step(
        &self,
        ctx: WorkflowContext,
        entry: &mut JournalEntry,
        plan: &WorkflowPlan,
        step: Step,
    ) -> Result<WorkflowContext, WorkflowError> {
        let address = entry.smart_account_address.clone();

        let signed: SignedStep = match step {
            Step::Derive => {
                entry.mark_completed(Step::Derive, None, None);
                self.journal.save(entry)?;
                return Ok(ctx);
            }
            Step::Fund => {
                self.workflow
                    .prepare_fund(&ctx, &address, plan.fund_amount, &plan.fund_denom)
                    .await?
            }
            Step::Activate => {
                self.workflow
                    .prepare_activate(&ctx, &plan.descriptor, &address)
                    .await?
            }
            Step::RegisterPlugin => {
                self.workflow
                    .prepare_register_plugin(&ctx, &address, &plan.plugin.registration(&address))
                    .await?
            }
            Step::RotateKey => {
                let (signed, _) = self
                    .workflow
                    .prepare_rotate_key(&ctx, &address, plan.rotated.clone(), &plan.credentials)
                    .await?;
                signed
            }
            Step::UnregisterPlugin => {
                self.workflow
                    .prepare_unregister_plugin(&ctx, &address, &plan.plugin.plugin_address)
                    .await?
            }
        };

        // An attempt signed below the current sequence either landed or can never land
        let superseded: Vec<TxAttempt> = entry
            .attempts(step)
            .into_iter()
            .filter(|a| a.signer_address == signed.signer_address && a.sequence < signed.sequence)
            .collect();
        if !superseded.is_empty() {
            if let Some(result) = self.find_included(&ctx, step, &superseded).await? {
                return self.settle(ctx, entry, plan, step, result);
            }
            for attempt in &superseded {
                entry.drop_attempt(&attempt.tx_hash);
            }
        }

        let tx_hash = signed.tx_hash.clone();
        entry.mark_pending(step, signed.attempt());
        self.journal.save(entry)?;

        match self.workflow.submit(&ctx, signed).await {
            Ok(result) => {
                entry.mark_completed(step, Some(&tx_hash), Some(result.height));
                self.journal.save(entry)?;
                Ok(self.after_step(ctx, entry, plan, step))
            }
            Err(e) if e.is_ambiguous() => {
                warn!(
                    "{} for {} left pending as {}; rerun to settle it before continuing",
                    step, address, tx_hash
                );
                Err(e)
            }
            Err(e) => {
                entry.drop_attempt(&tx_hash);

                // A refused attempt says nothing about earlier ones still in flight
                let earlier = entry.attempts(step);
                if !earlier.is_empty() {
                    if let Some(result) = self.find_included(&ctx, step, &earlier).await? {
                        return self.settle(ctx, entry, plan, step, result);
                    }
                }

                self.journal.save(entry)?;
                Err(e)
            }
        }
    }

    fn after_step(&self, ctx: WorkflowContext, entry: &JournalEntry, plan: &WorkflowPlan, step: Step) -> WorkflowContext {
        match step {
            Step::RotateKey => ctx.with_smart_account(plan.rotated.acting_for(&entry.smart_account_address)),
            _ => ctx,
        }
    }

    fn target_for(&self, entry: &JournalEntry, plan: &WorkflowPlan, step: Step, ctx: &WorkflowContext) -> super::StepTarget {
        let account = entry.smart_account_address.clone();
        let signer_address = match step {
            Step::Fund => ctx.funder().address().to_string(),
            Step::RotateKey => ctx.recoverer().address().to_string(),
            _ => account.clone(),
        };
        let plugin = matches!(step, Step::RegisterPlugin | Step::UnregisterPlugin)
            .then(|| plan.plugin.plugin_address.clone());

        super::StepTarget {
            signer_address,
            account,
            plugin,
        }
    }
}
