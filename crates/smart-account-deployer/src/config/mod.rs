use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::chain::Fee;
use crate::deploy::ContractRecord;

/// Environment variable holding the chain selector key
pub const CHAIN_SELECTOR_ENV: &str = "CHAIN_ID";
/// Environment variable overriding the mainnet RPC endpoint
pub const RPC_OVERRIDE_ENV: &str = "INTERNAL_RPC";
/// Profile used when no selector key is given
pub const DEFAULT_CHAIN_KEY: &str = "local";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerConfig {
    pub global: GlobalConfig,
    pub chains: HashMap<String, ChainEndpointProfile>,
    pub contracts: Vec<ContractRecord>,
    pub account: AccountConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Log level for the deployer
    pub log_level: String,
    /// Directory holding workflow progress journals
    pub journal_dir: PathBuf,
    /// Environment variable prefix for signer keys
    pub key_env_prefix: String,
}

/// Connection and fee parameters for one chain. Selected once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEndpointProfile {
    /// Tendermint RPC endpoint
    pub rpc_endpoint: String,
    /// Bech32 address prefix
    pub address_prefix: String,
    /// Denomination fees are paid in
    pub fee_denom: String,
    /// Chain identifier
    pub chain_id: String,
    /// How long to wait for a broadcast tx to be included
    pub broadcast_timeout_ms: u64,
    /// Interval between inclusion polls
    pub broadcast_poll_interval_ms: u64,
    /// Gas price in `fee_denom` per unit of gas
    pub gas_price: String,
    pub average_block_time_ms: u64,
    /// Environment variable that, when set, replaces `rpc_endpoint` for this profile only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_override_env: Option<String>,
}

impl ChainEndpointProfile {
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn broadcast_poll_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_poll_interval_ms)
    }

    /// Validate the profile before use
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc_endpoint.is_empty() {
            anyhow::bail!("Chain {} has no RPC endpoint", self.chain_id);
        }
        if self.broadcast_poll_interval_ms == 0 {
            anyhow::bail!("Chain {} has a zero broadcast poll interval", self.chain_id);
        }
        if self.broadcast_poll_interval_ms > self.broadcast_timeout_ms {
            anyhow::bail!(
                "Chain {} polls every {}ms but times out after {}ms",
                self.chain_id,
                self.broadcast_poll_interval_ms,
                self.broadcast_timeout_ms
            );
        }
        Fee::from_gas(1, &self.gas_price, &self.fee_denom)
            .map_err(|e| anyhow::anyhow!("Chain {}: {}", self.chain_id, e))?;
        Ok(())
    }
}

/// Gas limits per transaction kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasLimits {
    pub send: u64,
    pub activate: u64,
    pub execute: u64,
    pub recover: u64,
    pub store_code: u64,
    pub instantiate: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            send: 200_000,
            activate: 400_000,
            execute: 500_000,
            recover: 400_000,
            store_code: 20_000_000,
            instantiate: 500_000,
        }
    }
}

/// Parameters of the smart account bootstrapped by `activate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Code id of the smart-account base contract
    pub code_id: u64,
    /// Salt mixed into address derivation
    pub salt: String,
    /// Amount of `fee_denom` sent to the new account
    pub fund_amount: u64,
    /// Key funding and activating the account
    pub funding_key: String,
    /// Key allowed to recover the account through the recovery plugin
    pub recoverer_key: String,
    /// Key installed by the recovery step
    pub rotated_key: String,
    /// Contract record name of the recovery plugin
    pub recovery_plugin: String,
    /// Opaque credentials attached to the recovery message
    pub credentials: String,
    pub gas: GasLimits,
}

impl DeployerConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DeployerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` if it exists, otherwise fall back to the built-in profiles
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Select the chain profile named by `key`.
    /// `None` reads the key from `CHAIN_ID`, defaulting to the local profile.
    pub fn select_chain(&self, key: Option<&str>) -> anyhow::Result<ChainEndpointProfile> {
        let key = match key {
            Some(key) => key.to_string(),
            None => std::env::var(CHAIN_SELECTOR_ENV).unwrap_or_else(|_| DEFAULT_CHAIN_KEY.to_string()),
        };

        let mut profile = self
            .chains
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Unknown chain profile: {}", key))?;

        if let Some(var) = &profile.rpc_override_env {
            if let Ok(rpc) = std::env::var(var) {
                info!("Chain {} uses RPC endpoint {} from {}", key, rpc, var);
                profile.rpc_endpoint = rpc;
            }
        }

        profile.validate()?;
        Ok(profile)
    }

    /// Journal directory with `~` expanded
    pub fn journal_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.global.journal_dir.to_string_lossy()).to_string())
    }

    /// Tracing filter for the deployer's crates, preferring `level` over the configured one
    pub fn log_filter(&self, level: Option<&str>) -> String {
        let level = level.unwrap_or(&self.global.log_level);
        format!("smart_account_deployer={0},deployer={0}", level)
    }

    /// Get contract record by name
    pub fn get_contract(&self, name: &str) -> Option<&ContractRecord> {
        self.contracts.iter().find(|c| c.name == name)
    }
}

fn profile(
    rpc_endpoint: &str,
    fee_denom: &str,
    chain_id: &str,
    broadcast_timeout_ms: u64,
    broadcast_poll_interval_ms: u64,
    average_block_time_ms: u64,
) -> ChainEndpointProfile {
    ChainEndpointProfile {
        rpc_endpoint: rpc_endpoint.to_string(),
        address_prefix: "aura".to_string(),
        fee_denom: fee_denom.to_string(),
        chain_id: chain_id.to_string(),
        broadcast_timeout_ms,
        broadcast_poll_interval_ms,
        gas_price: "0.025".to_string(),
        average_block_time_ms,
        rpc_override_env: None,
    }
}

impl Default for DeployerConfig {
    fn default() -> Self {
        let mut chains = HashMap::new();

        chains.insert("local".to_string(), profile("http://localhost:26657", "uaura", "local-aura", 2000, 500, 1000));
        chains.insert("local-docker".to_string(), profile("http://dev-aurad:26657", "uaura", "local-aura", 2000, 500, 1000));
        chains.insert("serenity".to_string(), profile("https://rpc.serenity.aura.network", "uaura", "serenity-testnet-001", 5000, 1000, 1000));
        chains.insert("aura-testnet-2".to_string(), profile("https://rpc.dev.aura.network", "utaura", "aura-testnet-2", 5000, 1000, 1000));
        chains.insert("euphoria".to_string(), profile("https://rpc.euphoria.aura.network", "ueaura", "euphoria-2", 5000, 1000, 5000));
        chains.insert(
            "xstaxy-1".to_string(),
            ChainEndpointProfile {
                rpc_override_env: Some(RPC_OVERRIDE_ENV.to_string()),
                ..profile("https://rpc.aura.network", "uaura", "xstaxy-1", 10000, 1000, 5000)
            },
        );

        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            global: GlobalConfig {
                log_level: "info".to_string(),
                journal_dir: home.join(".pyxis").join("journal"),
                key_env_prefix: "DEPLOYER_KEY_".to_string(),
            },
            chains,
            contracts: ContractRecord::defaults(),
            account: AccountConfig {
                code_id: 726,
                salt: "1234".to_string(),
                fund_amount: 1_000_000,
                funding_key: "deployer".to_string(),
                recoverer_key: "deployer".to_string(),
                rotated_key: "rotated".to_string(),
                recovery_plugin: "simple-recovery-plugin".to_string(),
                credentials: String::new(),
                gas: GasLimits::default(),
            },
        }
    }
}
