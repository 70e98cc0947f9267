// Direct-mode transaction signing with a local secp256k1 key

use async_trait::async_trait;
use cosmos_sdk_proto::cosmos::base::v1beta1::Coin as ProtoCoin;
use cosmos_sdk_proto::cosmos::tx::signing::v1beta1::SignMode;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{
    mode_info, AuthInfo, Fee as ProtoFee, ModeInfo, SignDoc, SignerInfo, TxBody, TxRaw,
};
use cosmos_sdk_proto::Any;
use prost::Message;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::messages::public_key_any;
use super::{AccountData, ChainError, Fee, SignContext, Signer};
use crate::keystore::CosmosKey;

/// Signs with a single key held in memory.
///
/// The key may sign for its own address and for any smart account whose
/// authorised public key it matches; the chain verifies the pairing.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    key: CosmosKey,
}

impl LocalSigner {
    pub fn new(key: CosmosKey) -> Self {
        Self { key }
    }

    pub fn address(&self) -> &str {
        &self.key.address
    }

    pub fn public_key(&self) -> &[u8] {
        &self.key.public_key
    }

    fn build_tx_body(messages: Vec<Any>, memo: &str) -> TxBody {
        TxBody {
            messages,
            memo: memo.to_string(),
            timeout_height: 0,
            extension_options: vec![],
            non_critical_extension_options: vec![],
        }
    }

    fn build_auth_info(&self, fee: &Fee, sequence: u64) -> AuthInfo {
        let signer_info = SignerInfo {
            public_key: Some(public_key_any(&self.key.public_key)),
            mode_info: Some(ModeInfo {
                sum: Some(mode_info::Sum::Single(mode_info::Single {
                    mode: SignMode::Direct as i32,
                })),
            }),
            sequence,
        };

        AuthInfo {
            signer_infos: vec![signer_info],
            fee: Some(ProtoFee {
                amount: fee
                    .amount
                    .iter()
                    .map(|c| ProtoCoin {
                        denom: c.denom.clone(),
                        amount: c.amount.to_string(),
                    })
                    .collect(),
                gas_limit: fee.gas_limit,
                payer: String::new(),
                granter: String::new(),
            }),
            tip: None,
        }
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn accounts(&self) -> Result<Vec<AccountData>, ChainError> {
        Ok(vec![AccountData {
            address: self.key.address.clone(),
            public_key: self.key.public_key.clone(),
        }])
    }

    async fn sign(
        &self,
        signer_address: &str,
        messages: Vec<Any>,
        fee: &Fee,
        memo: &str,
        context: &SignContext,
    ) -> Result<Vec<u8>, ChainError> {
        debug!(
            "Signing {} message(s) for {} with key {} (acc: {}, seq: {})",
            messages.len(),
            signer_address,
            self.key.address,
            context.account_number,
            context.sequence
        );

        let body_bytes = Self::build_tx_body(messages, memo).encode_to_vec();
        let auth_info_bytes = self.build_auth_info(fee, context.sequence).encode_to_vec();

        let sign_doc = SignDoc {
            body_bytes: body_bytes.clone(),
            auth_info_bytes: auth_info_bytes.clone(),
            chain_id: context.chain_id.clone(),
            account_number: context.account_number,
        };

        let digest = Sha256::digest(sign_doc.encode_to_vec());
        let signature = self.key.sign_digest(&digest)?;

        let tx = TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![signature],
        };

        Ok(tx.encode_to_vec())
    }
}
