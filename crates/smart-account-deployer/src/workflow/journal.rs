// On-disk progress journal: one JSON file per smart account

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Step, WorkflowError};
use crate::account::SmartAccountDescriptor;

/// One signed transaction handed to the chain for a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAttempt {
    pub tx_hash: String,
    /// Account whose sequence the transaction consumes
    pub signer_address: String,
    pub sequence: u64,
    pub submitted_at: DateTime<Utc>,
}

impl TxAttempt {
    pub fn new(tx_hash: &str, signer_address: &str, sequence: u64) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
            signer_address: signer_address.to_string(),
            sequence,
            submitted_at: Utc::now(),
        }
    }
}

/// A step whose transactions were broadcast but never seen confirmed or refused.
///
/// Every attempt stays listed until the step settles: any of them may still land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStep {
    pub step: Step,
    pub attempts: Vec<TxAttempt>,
}

impl PendingStep {
    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        self.attempts.iter().map(|a| a.tx_hash.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step: Step,
    pub tx_hash: Option<String>,
    pub height: Option<u64>,
    pub completed_at: DateTime<Utc>,
}

/// Progress of one smart account through the workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub smart_account_address: String,
    pub descriptor: SmartAccountDescriptor,
    pub last_completed: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingStep>,
    #[serde(default)]
    pub history: Vec<CompletedStep>,
    pub updated_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn new(smart_account_address: &str, descriptor: SmartAccountDescriptor) -> Self {
        Self {
            smart_account_address: smart_account_address.to_string(),
            descriptor,
            last_completed: None,
            pending: None,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Record an attempt for `step`, keeping earlier attempts of the same step
    pub fn mark_pending(&mut self, step: Step, attempt: TxAttempt) {
        match &mut self.pending {
            Some(pending) if pending.step == step => pending.attempts.push(attempt),
            _ => {
                self.pending = Some(PendingStep {
                    step,
                    attempts: vec![attempt],
                })
            }
        }
        self.updated_at = Utc::now();
    }

    /// Attempts of `step` still awaiting an outcome
    pub fn attempts(&self, step: Step) -> Vec<TxAttempt> {
        self.pending
            .as_ref()
            .filter(|p| p.step == step)
            .map(|p| p.attempts.clone())
            .unwrap_or_default()
    }

    /// Drop an attempt that can never be applied
    pub fn drop_attempt(&mut self, tx_hash: &str) {
        if let Some(pending) = &mut self.pending {
            pending.attempts.retain(|a| a.tx_hash != tx_hash);
            if pending.attempts.is_empty() {
                self.pending = None;
            }
        }
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, step: Step, tx_hash: Option<&str>, height: Option<u64>) {
        let now = Utc::now();
        self.last_completed = Some(step);
        self.pending = None;
        self.history.push(CompletedStep {
            step,
            tx_hash: tx_hash.map(str::to_string),
            height,
            completed_at: now,
        });
        self.updated_at = now;
    }

    /// Forget every attempt of a step the chain settled as failed
    pub fn clear_pending(&mut self) {
        self.pending = None;
        self.updated_at = Utc::now();
    }

    /// First step not yet completed, `None` once the whole plan has run
    pub fn next_step(&self) -> Option<Step> {
        match self.last_completed {
            None => Some(Step::Derive),
            Some(step) => step.next(),
        }
    }
}

/// Directory of journal entries keyed by smart-account address
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn entry_path(&self, address: &str) -> PathBuf {
        self.dir.join(format!("{}.json", address))
    }

    pub fn load(&self, address: &str) -> Result<Option<JournalEntry>, WorkflowError> {
        let path = self.entry_path(address);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let entry = serde_json::from_str(&content)?;
        Ok(Some(entry))
    }

    /// Write the entry through a temporary file so a crash never leaves half a journal
    pub fn save(&self, entry: &JournalEntry) -> Result<(), WorkflowError> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.entry_path(&entry.smart_account_address);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(entry)?)?;
        std::fs::rename(&tmp, &path)?;

        debug!(
            "Journal for {} saved (last completed: {:?}, pending: {:?})",
            entry.smart_account_address,
            entry.last_completed,
            entry.pending.as_ref().map(|p| p.hashes().collect::<Vec<_>>())
        );
        Ok(())
    }

    /// All entries in the journal directory, sorted by address
    pub fn list(&self) -> Result<Vec<JournalEntry>, WorkflowError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for item in std::fs::read_dir(&self.dir)? {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            entries.push(serde_json::from_str::<JournalEntry>(&content)?);
        }

        entries.sort_by(|a, b| a.smart_account_address.cmp(&b.smart_account_address));
        Ok(entries)
    }
}
