// Signing key management for the deployer identities
// Keys are supplied through environment variables; mnemonic handling lives outside this crate

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub mod cosmos;

pub use cosmos::{address_from_public_key, CosmosKey};

/// Errors that can occur during key management operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid key format: {0}")]
    InvalidFormat(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

/// Configuration for the key manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyManagerConfig {
    /// Environment variable prefix (e.g., "DEPLOYER_KEY_")
    pub env_prefix: String,
    /// Bech32 prefix used when deriving addresses
    pub address_prefix: String,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            env_prefix: "DEPLOYER_KEY_".to_string(),
            address_prefix: "aura".to_string(),
        }
    }
}

/// Resolves named identities ("deployer", "recoverer", ...) to signing keys
pub struct KeyManager {
    /// Cache of loaded keys (name -> key)
    key_cache: HashMap<String, CosmosKey>,
    config: KeyManagerConfig,
}

impl KeyManager {
    pub fn new(config: KeyManagerConfig) -> Self {
        Self {
            key_cache: HashMap::new(),
            config,
        }
    }

    /// Load the key registered under `name`, consulting the environment on a cache miss
    pub fn load_key(&mut self, name: &str) -> Result<CosmosKey, KeyError> {
        if let Some(key) = self.key_cache.get(name) {
            return Ok(key.clone());
        }

        let key = self.load_from_env(name)?;
        key.validate()?;
        self.key_cache.insert(name.to_string(), key.clone());
        Ok(key)
    }

    fn env_var_name(&self, name: &str) -> String {
        format!(
            "{}{}",
            self.config.env_prefix,
            name.to_uppercase().replace('-', "_")
        )
    }

    fn load_from_env(&self, name: &str) -> Result<CosmosKey, KeyError> {
        let env_var = self.env_var_name(name);

        let key_data = std::env::var(&env_var)
            .map_err(|_| KeyError::EnvVarNotFound(env_var.clone()))?;

        CosmosKey::from_env_string(&key_data, &self.config.address_prefix)
    }
}
