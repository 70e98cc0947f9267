// Smart-account data model: descriptors, plugin registrations and contract messages
use serde::{Deserialize, Serialize};

/// Everything the chain mixes into a smart-account address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SmartAccountDescriptor {
    /// Code id of the smart-account contract
    pub code_id: u64,
    /// Arbitrary bytes allowing several accounts per code id
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
    /// Instantiate message of the account contract (JSON bytes)
    #[serde(with = "hex_bytes")]
    pub init_payload: Vec<u8>,
    /// Compressed secp256k1 public key the account starts with
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

impl SmartAccountDescriptor {
    /// Descriptor for an account managed by the plugin manager at `plugin_manager_addr`
    pub fn new(code_id: u64, salt: &str, plugin_manager_addr: &str, public_key: Vec<u8>) -> Self {
        let init_payload = serde_json::json!({ "plugin_manager_addr": plugin_manager_addr });
        Self {
            code_id,
            salt: salt.as_bytes().to_vec(),
            init_payload: init_payload.to_string().into_bytes(),
            public_key,
        }
    }
}

/// A plugin attached to a smart account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRegistration {
    pub plugin_address: String,
    /// Checksum of the plugin code, as allowed by the plugin manager
    pub checksum: String,
    pub config_payload: serde_json::Value,
}

/// Configuration parsed by the simple recovery plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub smart_account_address: String,
    pub recover_address: String,
}

impl RecoveryConfig {
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "smart_account_address": self.smart_account_address,
            "recover_address": self.recover_address,
        })
    }
}

/// Execute messages understood by the smart-account base contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartAccountExecuteMsg {
    RegisterPlugin {
        plugin_address: String,
        checksum: String,
        /// Plugin configuration, JSON-encoded as a string
        config: String,
    },
    UnregisterPlugin {
        plugin_address: String,
    },
}

impl SmartAccountExecuteMsg {
    pub fn register(registration: &PluginRegistration) -> Self {
        SmartAccountExecuteMsg::RegisterPlugin {
            plugin_address: registration.plugin_address.clone(),
            checksum: registration.checksum.clone(),
            config: registration.config_payload.to_string(),
        }
    }

    pub fn unregister(plugin_address: &str) -> Self {
        SmartAccountExecuteMsg::UnregisterPlugin {
            plugin_address: plugin_address.to_string(),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
