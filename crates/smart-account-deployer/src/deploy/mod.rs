// Contract upload, plugin-manager instantiation and recovery-plugin allow-listing

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::chain::{ChainClient, ChainError, InstantiateOptions};

pub const PLUGIN_MANAGER: &str = "plugin-manager";
pub const SAMPLE_PLUGIN: &str = "sample-plugin";
pub const SIMPLE_RECOVERY_PLUGIN: &str = "simple-recovery-plugin";
pub const SMART_ACCOUNT_BASE: &str = "pyxis-sm-base";

/// Version the recovery plugin is allow-listed under
pub const RECOVERY_PLUGIN_VERSION: &str = "0.1.0";

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Contract {0} is not in the registry")]
    UnknownContract(String),

    #[error("Contract {0} has no artifact path")]
    MissingArtifact(String),

    #[error("Failed to read artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{field} of {name} is already set to {current}")]
    AlreadyAssigned {
        name: String,
        field: &'static str,
        current: String,
    },

    #[error("Upload tx {tx_hash} reported no code id for {name} (checksum {checksum})")]
    MissingCodeId {
        name: String,
        checksum: String,
        tx_hash: String,
    },

    #[error("Contract {0} has no code id")]
    NoCodeId(String),

    #[error("Contract {0} has no contract address")]
    NotInstantiated(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

/// A deployed (or to-be-deployed) contract. Fields are filled once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    /// Hex sha256 of the uploaded wasm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl ContractRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            code_id: None,
            contract_address: None,
            checksum: None,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_code_id(mut self, code_id: u64) -> Self {
        self.code_id = Some(code_id);
        self
    }

    pub fn with_contract_address(mut self, address: &str) -> Self {
        self.contract_address = Some(address.to_string());
        self
    }

    pub fn set_code_id(&mut self, code_id: u64) -> Result<(), DeployError> {
        fill_once(&self.name, "code_id", &mut self.code_id, code_id)
    }

    pub fn set_contract_address(&mut self, address: &str) -> Result<(), DeployError> {
        fill_once(&self.name, "contract_address", &mut self.contract_address, address.to_string())
    }

    pub fn set_checksum(&mut self, checksum: &str) -> Result<(), DeployError> {
        fill_once(&self.name, "checksum", &mut self.checksum, checksum.to_string())
    }

    /// Contracts of the Pyxis smart-account system as deployed on the Aura networks
    pub fn defaults() -> Vec<ContractRecord> {
        vec![
            ContractRecord::new(PLUGIN_MANAGER)
                .with_artifact("artifacts/pyxis_plugin_manager.wasm")
                .with_code_id(723)
                .with_contract_address("aura1mjq9u2pteesx4wr4u3ddnxhxcspyz2yk7rt4snq820la0cwpruvs0qkhk8"),
            ContractRecord::new(SAMPLE_PLUGIN)
                .with_artifact("artifacts/sample_plugin.wasm")
                .with_code_id(724),
            ContractRecord::new(SIMPLE_RECOVERY_PLUGIN)
                .with_artifact("artifacts/simple_recovery_plugin.wasm")
                .with_code_id(725),
            ContractRecord::new(SMART_ACCOUNT_BASE)
                .with_artifact("artifacts/pyxis_sm_base.wasm")
                .with_code_id(726),
        ]
    }
}

fn fill_once<T>(name: &str, field: &'static str, slot: &mut Option<T>, value: T) -> Result<(), DeployError>
where
    T: PartialEq + std::fmt::Display,
{
    match slot {
        Some(current) if *current == value => Ok(()),
        Some(current) => Err(DeployError::AlreadyAssigned {
            name: name.to_string(),
            field,
            current: current.to_string(),
        }),
        None => {
            *slot = Some(value);
            Ok(())
        }
    }
}

/// Named set of contract records
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    records: Vec<ContractRecord>,
}

impl ContractRegistry {
    pub fn new(records: Vec<ContractRecord>) -> Self {
        Self { records }
    }

    pub fn get(&self, name: &str) -> Result<&ContractRecord, DeployError> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| DeployError::UnknownContract(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ContractRecord, DeployError> {
        self.records
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| DeployError::UnknownContract(name.to_string()))
    }

    pub fn records(&self) -> &[ContractRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ContractRecord> {
        self.records
    }
}

/// Upload every record that has no code id yet, in a single transaction.
///
/// Code ids are matched back to records through the checksum the chain
/// reports in its `store_code` events.
pub async fn upload_contracts(
    chain: &dyn ChainClient,
    sender: &str,
    registry: &mut ContractRegistry,
) -> Result<Vec<String>, DeployError> {
    let mut names = Vec::new();
    let mut wasm_modules = Vec::new();

    for record in registry.records.iter_mut() {
        if let Some(code_id) = record.code_id {
            info!("{} already has code id {}, skipping upload", record.name, code_id);
            continue;
        }

        let path = record
            .artifact
            .clone()
            .ok_or_else(|| DeployError::MissingArtifact(record.name.clone()))?;
        let wasm = tokio::fs::read(&path)
            .await
            .map_err(|source| DeployError::Artifact { path: path.clone(), source })?;

        let checksum = hex::encode(Sha256::digest(&wasm));
        record.set_checksum(&checksum)?;
        info!("Uploading {} ({} bytes, checksum {})", record.name, wasm.len(), checksum);

        names.push(record.name.clone());
        wasm_modules.push(wasm);
    }

    if wasm_modules.is_empty() {
        info!("Nothing to upload");
        return Ok(names);
    }

    let tx = chain.store_code(sender, wasm_modules).await?;

    for event in tx.events_of("store_code") {
        let find = |key: &str| {
            event
                .attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let (Some(checksum), Some(code_id)) = (find("code_checksum"), find("code_id")) else {
            continue;
        };
        let Ok(code_id) = code_id.parse::<u64>() else {
            warn!("Ignoring unparsable code id {:?} in {}", code_id, tx.tx_hash);
            continue;
        };

        let checksum = checksum.to_lowercase();
        if let Some(record) = registry
            .records
            .iter_mut()
            .find(|r| r.code_id.is_none() && r.checksum.as_deref() == Some(checksum.as_str()))
        {
            record.set_code_id(code_id)?;
            info!("{} stored with code id {}", record.name, code_id);
        }
    }

    for name in &names {
        let record = registry.get(name)?;
        if record.code_id.is_none() {
            return Err(DeployError::MissingCodeId {
                name: name.clone(),
                checksum: record.checksum.clone().unwrap_or_default(),
                tx_hash: tx.tx_hash.clone(),
            });
        }
    }

    Ok(names)
}

/// Instantiate the plugin manager with `deployer` as admin, unless it already has an address
pub async fn setup_plugin_manager(
    chain: &dyn ChainClient,
    deployer: &str,
    registry: &mut ContractRegistry,
) -> Result<String, DeployError> {
    let record = registry.get_mut(PLUGIN_MANAGER)?;

    if let Some(address) = &record.contract_address {
        info!("Plugin manager already instantiated at {}", address);
        return Ok(address.clone());
    }

    let code_id = record
        .code_id
        .ok_or_else(|| DeployError::NoCodeId(record.name.clone()))?;

    let result = chain
        .instantiate_contract(
            deployer,
            code_id,
            &serde_json::json!({ "admin": deployer }),
            "pyxis plugin manager",
            Vec::new(),
            InstantiateOptions {
                admin: Some(deployer.to_string()),
                memo: String::new(),
            },
        )
        .await?;

    record.set_contract_address(&result.contract_address)?;
    info!("Plugin manager instantiated at {}", result.contract_address);
    Ok(result.contract_address)
}

/// Instantiate the simple recovery plugin, record its code checksum, and allow it
/// on the plugin manager so smart accounts can register it.
///
/// Instantiation is skipped when the record already has an address. The
/// allow-list entry is sent every time; the manager overwrites it.
pub async fn setup_recovery_plugin(
    chain: &dyn ChainClient,
    deployer: &str,
    registry: &mut ContractRegistry,
) -> Result<String, DeployError> {
    let manager = registry
        .get(PLUGIN_MANAGER)?
        .contract_address
        .clone()
        .ok_or_else(|| DeployError::NotInstantiated(PLUGIN_MANAGER.to_string()))?;

    let record = registry.get_mut(SIMPLE_RECOVERY_PLUGIN)?;
    let code_id = record
        .code_id
        .ok_or_else(|| DeployError::NoCodeId(record.name.clone()))?;

    let checksum = chain.code_checksum(code_id).await?;
    record.set_checksum(&checksum)?;

    let address = match record.contract_address.clone() {
        Some(address) => {
            info!("Recovery plugin already instantiated at {}", address);
            address
        }
        None => {
            let result = chain
                .instantiate_contract(
                    deployer,
                    code_id,
                    &serde_json::json!({}),
                    "pyxis simple recovery plugin",
                    Vec::new(),
                    InstantiateOptions {
                        admin: Some(deployer.to_string()),
                        memo: String::new(),
                    },
                )
                .await?;
            record.set_contract_address(&result.contract_address)?;
            info!("Recovery plugin instantiated at {}", result.contract_address);
            result.contract_address
        }
    };

    let allow = serde_json::json!({
        "allow_plugin": {
            "plugin_info": {
                "name": SIMPLE_RECOVERY_PLUGIN,
                "code_id": code_id,
                "version": RECOVERY_PLUGIN_VERSION,
                "address": address,
                "checksum": checksum,
            }
        }
    });
    let tx = chain.execute_contract(deployer, &manager, &allow, Vec::new()).await?;
    info!("Recovery plugin {} allowed by {} in tx {}", address, manager, tx.tx_hash);

    Ok(address)
}
