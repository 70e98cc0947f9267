// Cosmos secp256k1 key used by the deployer identities
use super::KeyError;
use bech32::{ToBase32, Variant};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Cosmos account key with secp256k1 cryptography
#[derive(Clone, Serialize, Deserialize)]
pub struct CosmosKey {
    /// Bech32 address (e.g., aura1...)
    pub address: String,
    /// Private key bytes (32 bytes for secp256k1)
    pub private_key: Vec<u8>,
    /// Public key bytes (33 bytes compressed)
    pub public_key: Vec<u8>,
}

// Keep secret bytes out of logs.
impl std::fmt::Debug for CosmosKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosKey")
            .field("address", &self.address)
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

impl CosmosKey {
    /// Create a new key from private key bytes, deriving the address under `address_prefix`
    pub fn from_private_key(private_key: Vec<u8>, address_prefix: &str) -> Result<Self, KeyError> {
        if private_key.len() != 32 {
            return Err(KeyError::InvalidFormat(
                "Private key must be 32 bytes".to_string()
            ));
        }

        let public_key = Self::derive_public_key(&private_key)?;
        let address = address_from_public_key(&public_key, address_prefix)?;

        Ok(Self {
            address,
            private_key,
            public_key,
        })
    }

    /// Create from the environment variable format.
    /// Format: "aura1...:hexPrivateKey" or just "hexPrivateKey"
    pub fn from_env_string(env_str: &str, address_prefix: &str) -> Result<Self, KeyError> {
        let parts: Vec<&str> = env_str.trim().split(':').collect();

        let (address, hex_key) = match parts.as_slice() {
            [address, key] => (Some(address.to_string()), *key),
            [key] => (None, *key),
            _ => {
                return Err(KeyError::InvalidFormat(
                    "Expected format: 'address:privateKey' or 'privateKey'".to_string()
                ))
            }
        };

        let private_key = hex::decode(hex_key)
            .map_err(|e| KeyError::InvalidFormat(format!("Invalid hex key: {}", e)))?;

        let mut key = Self::from_private_key(private_key, address_prefix)?;
        if let Some(address) = address {
            if address != key.address {
                return Err(KeyError::InvalidFormat(format!(
                    "Address {} does not belong to the supplied key (expected {})",
                    address, key.address
                )));
            }
            key.address = address;
        }

        Ok(key)
    }

    /// Sign a 32-byte digest, returning the 64-byte compact signature Cosmos expects
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        let secp = secp256k1::Secp256k1::signing_only();
        let secret_key = secp256k1::SecretKey::from_slice(&self.private_key)
            .map_err(|e| KeyError::Crypto(format!("Invalid private key: {}", e)))?;
        let message = secp256k1::Message::from_digest_slice(digest)
            .map_err(|e| KeyError::Crypto(format!("Invalid message hash: {}", e)))?;

        let signature = secp.sign_ecdsa(&message, &secret_key);
        Ok(signature.serialize_compact().to_vec())
    }

    fn derive_public_key(private_key: &[u8]) -> Result<Vec<u8>, KeyError> {
        let secp = secp256k1::Secp256k1::new();
        let secret_key = secp256k1::SecretKey::from_slice(private_key)
            .map_err(|e| KeyError::Crypto(format!("Invalid private key: {}", e)))?;
        let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);

        Ok(public_key.serialize().to_vec())
    }

    /// Validate the key structure
    pub fn validate(&self) -> Result<(), KeyError> {
        if self.private_key.len() != 32 {
            return Err(KeyError::InvalidFormat(
                "Private key must be 32 bytes".to_string()
            ));
        }

        if self.public_key.len() != 33 {
            return Err(KeyError::InvalidFormat(
                "Public key must be 33 bytes (compressed)".to_string()
            ));
        }

        let derived_pubkey = Self::derive_public_key(&self.private_key)?;
        if derived_pubkey != self.public_key {
            return Err(KeyError::InvalidFormat(
                "Public key does not match private key".to_string()
            ));
        }

        Ok(())
    }
}

/// Cosmos account address: bech32(prefix, ripemd160(sha256(pubkey)))
pub fn address_from_public_key(public_key: &[u8], prefix: &str) -> Result<String, KeyError> {
    let sha_hash = Sha256::digest(public_key);
    let ripemd_hash = Ripemd160::digest(sha_hash);

    bech32::encode(prefix, ripemd_hash.to_base32(), Variant::Bech32)
        .map_err(|e| KeyError::InvalidFormat(format!("bech32 encoding failed: {}", e)))
}
