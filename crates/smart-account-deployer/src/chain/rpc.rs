// Tendermint JSON-RPC client: account queries, address derivation,
// broadcasting and inclusion polling

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use cosmos_sdk_proto::cosmos::auth::v1beta1::{BaseAccount, QueryAccountRequest, QueryAccountResponse};
use cosmos_sdk_proto::cosmwasm::wasm::v1::{QueryCodeRequest, QueryCodeResponse};
use cosmos_sdk_proto::Any;
use prost::Message;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::messages::{
    self, QueryGenerateAccountResponse, SmartAccount, BASE_ACCOUNT_TYPE_URL, QUERY_ACCOUNT_PATH,
    QUERY_CODE_PATH, QUERY_GENERATE_ACCOUNT_PATH, SMART_ACCOUNT_TYPE_URL,
};
use super::{
    tx_hash, AddressDeriver, ChainClient, ChainError, Coin, Fee, InstantiateOptions,
    InstantiateResult, SignContext, Signer, TxEvent, TxResult,
};
use crate::account::SmartAccountDescriptor;
use crate::config::{ChainEndpointProfile, GasLimits};

/// Account number and sequence as stored by x/auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: String,
    pub account_number: u64,
    pub sequence: u64,
    /// Whether the account is an activated smart account
    pub is_smart_account: bool,
}

/// Chain client speaking Tendermint JSON-RPC over HTTP
pub struct RpcChainClient {
    profile: ChainEndpointProfile,
    client: Client,
    signer: Option<Arc<dyn Signer>>,
    gas: GasLimits,
    chain_id: OnceCell<String>,
}

impl RpcChainClient {
    /// Create a client for the given chain profile.
    ///
    /// Every HTTP request is bounded by the profile's broadcast timeout.
    pub fn new(profile: ChainEndpointProfile) -> Result<Self, ChainError> {
        let client = Client::builder().timeout(profile.broadcast_timeout()).build()?;

        Ok(Self {
            profile,
            client,
            signer: None,
            gas: GasLimits::default(),
            chain_id: OnceCell::new(),
        })
    }

    /// Attach the signer used by the signing conveniences (`send_tokens`, `store_code`, ...)
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_gas_limits(mut self, gas: GasLimits) -> Self {
        self.gas = gas;
        self
    }

    /// Issue a JSON-RPC call and return its `result`
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        debug!("RPC {} -> {}", method, self.profile.rpc_endpoint);

        let response = self
            .client
            .post(&self.profile.rpc_endpoint)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        let body: Value = response.json().await?;

        if let Some(error) = body.get("error") {
            let message = match (error["message"].as_str(), error["data"].as_str()) {
                (Some(message), Some(data)) => format!("{}: {}", message, data),
                (Some(message), None) => message.to_string(),
                _ => error.to_string(),
            };
            return Err(ChainError::Rpc {
                code: error["code"].as_i64().unwrap_or_default(),
                message,
            });
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse(format!("{} response has no result", method)))
    }

    /// Run a gRPC-style query through `abci_query`, returning the raw response value
    async fn abci_query(&self, path: &str, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let result = self
            .rpc_call(
                "abci_query",
                json!({
                    "path": path,
                    "data": hex::encode(data),
                    "prove": false,
                }),
            )
            .await?;

        let response = &result["response"];
        let code = response["code"].as_u64().unwrap_or_default();
        if code != 0 {
            let log = response["log"].as_str().unwrap_or_default().to_string();
            return Err(ChainError::Rpc {
                code: code as i64,
                message: format!("abci query {} failed: {}", path, log),
            });
        }

        match response["value"].as_str() {
            Some(value) => general_purpose::STANDARD
                .decode(value)
                .map_err(|e| ChainError::InvalidResponse(format!("invalid abci value: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    /// Query account number and sequence, understanding both base and smart accounts
    pub async fn query_account(&self, address: &str) -> Result<AccountInfo, ChainError> {
        let request = QueryAccountRequest {
            address: address.to_string(),
        };

        let value = match self.abci_query(QUERY_ACCOUNT_PATH, request.encode_to_vec()).await {
            Ok(value) => value,
            Err(ChainError::Rpc { message, .. }) if message.contains("not found") => {
                return Err(ChainError::AccountNotFound(address.to_string()))
            }
            Err(e) => return Err(e),
        };

        let response = QueryAccountResponse::decode(value.as_slice())?;
        let account = response
            .account
            .ok_or_else(|| ChainError::AccountNotFound(address.to_string()))?;

        decode_account(address, &account)
    }

    /// Sign `messages` as `signer_address` with the attached signer and broadcast them
    async fn sign_and_broadcast(
        &self,
        signer_address: &str,
        messages: Vec<Any>,
        gas_limit: u64,
        memo: &str,
    ) -> Result<TxResult, ChainError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ChainError::NoSigner(signer_address.to_string()))?;

        let fee = Fee::from_gas(gas_limit, &self.profile.gas_price, &self.profile.fee_denom)?;
        let context = self.get_sign_context(signer_address).await?;
        let tx_bytes = signer.sign(signer_address, messages, &fee, memo, &context).await?;

        self.broadcast(tx_bytes).await
    }
}

fn decode_account(address: &str, account: &Any) -> Result<AccountInfo, ChainError> {
    match account.type_url.as_str() {
        BASE_ACCOUNT_TYPE_URL => {
            let base = BaseAccount::decode(account.value.as_slice())?;
            Ok(AccountInfo {
                address: address.to_string(),
                account_number: base.account_number,
                sequence: base.sequence,
                is_smart_account: false,
            })
        }
        SMART_ACCOUNT_TYPE_URL => {
            let smart = SmartAccount::decode(account.value.as_slice())?;
            Ok(AccountInfo {
                address: address.to_string(),
                account_number: smart.account_number,
                sequence: smart.sequence,
                is_smart_account: true,
            })
        }
        other => Err(ChainError::InvalidResponse(format!(
            "unsupported account type {} for {}",
            other, address
        ))),
    }
}

/// Parse a `u64` that Tendermint may render as a string or a number
fn parse_u64(value: &Value) -> u64 {
    match value {
        Value::String(s) => s.parse().unwrap_or_default(),
        Value::Number(n) => n.as_u64().unwrap_or_default(),
        _ => 0,
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Decode event attributes; Tendermint 0.34 base64-encodes both key and value
fn parse_events(events: &Value) -> Vec<TxEvent> {
    let Some(events) = events.as_array() else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(|event| {
            let event_type = event["type"].as_str()?.to_string();
            let attributes = event["attributes"]
                .as_array()
                .map(|attrs| {
                    attrs
                        .iter()
                        .filter_map(|attr| {
                            let key = attr["key"].as_str()?;
                            let value = attr["value"].as_str().unwrap_or_default();

                            let decoded_key = general_purpose::STANDARD
                                .decode(key)
                                .ok()
                                .and_then(|bytes| String::from_utf8(bytes).ok())
                                .filter(|k| is_identifier(k));

                            match decoded_key {
                                Some(decoded_key) => {
                                    let decoded_value = general_purpose::STANDARD
                                        .decode(value)
                                        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                                        .unwrap_or_else(|_| value.to_string());
                                    Some((decoded_key, decoded_value))
                                }
                                None => Some((key.to_string(), value.to_string())),
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();

            Some(TxEvent {
                event_type,
                attributes,
            })
        })
        .collect()
}

fn parse_tx_result(tx_hash: &str, result: &Value) -> TxResult {
    let tx_result = &result["tx_result"];
    TxResult {
        tx_hash: result["hash"].as_str().unwrap_or(tx_hash).to_string(),
        height: parse_u64(&result["height"]),
        code: parse_u64(&tx_result["code"]) as u32,
        codespace: tx_result["codespace"].as_str().unwrap_or_default().to_string(),
        gas_used: parse_u64(&tx_result["gas_used"]),
        raw_log: tx_result["log"].as_str().unwrap_or_default().to_string(),
        events: parse_events(&tx_result["events"]),
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<String, ChainError> {
        let chain_id = self
            .chain_id
            .get_or_try_init(|| async {
                let status = self.rpc_call("status", json!({})).await?;
                let network = status["node_info"]["network"]
                    .as_str()
                    .ok_or_else(|| ChainError::InvalidResponse("status has no network".to_string()))?
                    .to_string();

                if network != self.profile.chain_id {
                    return Err(ChainError::ChainIdMismatch {
                        expected: self.profile.chain_id.clone(),
                        actual: network,
                    });
                }
                Ok(network)
            })
            .await?;

        Ok(chain_id.clone())
    }

    async fn get_sign_context(&self, address: &str) -> Result<SignContext, ChainError> {
        let account = self.query_account(address).await?;
        let context = SignContext {
            chain_id: self.chain_id().await?,
            account_number: account.account_number,
            sequence: account.sequence,
        };

        info!(
            "Sign data for {}: chain {}, acc {}, seq {}",
            address, context.chain_id, context.account_number, context.sequence
        );
        Ok(context)
    }

    async fn broadcast(&self, tx_bytes: Vec<u8>) -> Result<TxResult, ChainError> {
        let hash = tx_hash(&tx_bytes);
        let timeout = self.profile.broadcast_timeout();
        let poll_interval = self.profile.broadcast_poll_interval();

        // Once the request is sent the node may have accepted the tx whatever we hear back
        let check = self
            .rpc_call(
                "broadcast_tx_sync",
                json!({ "tx": general_purpose::STANDARD.encode(&tx_bytes) }),
            )
            .await
            .map_err(|e| ChainError::BroadcastUnconfirmed {
                tx_hash: hash.clone(),
                reason: e.to_string(),
            })?;

        let code = parse_u64(&check["code"]) as u32;
        if code != 0 {
            return Err(ChainError::Rejected {
                tx_hash: hash,
                codespace: check["codespace"].as_str().unwrap_or_default().to_string(),
                code,
                log: check["log"].as_str().unwrap_or_default().to_string(),
            });
        }

        info!("Broadcast {}; waiting up to {:?} for inclusion", hash, timeout);

        let started = Instant::now();
        loop {
            sleep(poll_interval).await;

            match self.get_tx(&hash).await {
                Ok(Some(result)) => {
                    info!("Transaction {} included at height {}", hash, result.height);
                    return result.into_result();
                }
                Ok(None) => debug!("Transaction {} not yet included", hash),
                Err(e) => warn!("Polling for {} failed: {}", hash, e),
            }

            if started.elapsed() >= timeout {
                return Err(ChainError::BroadcastTimeout {
                    tx_hash: hash,
                    timeout_ms: self.profile.broadcast_timeout_ms,
                });
            }
        }
    }

    async fn get_tx(&self, tx_hash: &str) -> Result<Option<TxResult>, ChainError> {
        let hash_bytes = hex::decode(tx_hash)
            .map_err(|e| ChainError::InvalidResponse(format!("invalid tx hash {}: {}", tx_hash, e)))?;

        match self
            .rpc_call(
                "tx",
                json!({ "hash": general_purpose::STANDARD.encode(hash_bytes), "prove": false }),
            )
            .await
        {
            Ok(result) => Ok(Some(parse_tx_result(tx_hash, &result))),
            Err(ChainError::Rpc { message, .. }) if message.contains("not found") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send_tokens(
        &self,
        from: &str,
        to: &str,
        amount: u128,
        denom: &str,
    ) -> Result<TxResult, ChainError> {
        let msg = messages::msg_send(from, to, &[Coin::new(amount, denom)]);
        self.sign_and_broadcast(from, vec![msg], self.gas.send, "").await
    }

    async fn instantiate_contract(
        &self,
        sender: &str,
        code_id: u64,
        init_payload: &Value,
        label: &str,
        funds: Vec<Coin>,
        options: InstantiateOptions,
    ) -> Result<InstantiateResult, ChainError> {
        let msg = messages::msg_instantiate_contract(
            sender,
            options.admin.as_deref(),
            code_id,
            label,
            init_payload,
            &funds,
        )?;

        let tx = self
            .sign_and_broadcast(sender, vec![msg], self.gas.instantiate, &options.memo)
            .await?;

        let contract_address = tx
            .attribute("instantiate", "_contract_address")
            .ok_or_else(|| {
                ChainError::InvalidResponse(format!("tx {} has no instantiate event", tx.tx_hash))
            })?
            .to_string();

        Ok(InstantiateResult {
            contract_address,
            tx,
        })
    }

    async fn execute_contract(
        &self,
        sender: &str,
        contract: &str,
        msg: &Value,
        funds: Vec<Coin>,
    ) -> Result<TxResult, ChainError> {
        let msg = messages::msg_execute_contract(sender, contract, msg, &funds)?;
        self.sign_and_broadcast(sender, vec![msg], self.gas.execute, "").await
    }

    async fn store_code(&self, sender: &str, wasm_modules: Vec<Vec<u8>>) -> Result<TxResult, ChainError> {
        let count = wasm_modules.len() as u64;
        let msgs = wasm_modules
            .into_iter()
            .map(|wasm| messages::msg_store_code(sender, wasm))
            .collect();

        self.sign_and_broadcast(sender, msgs, self.gas.store_code.saturating_mul(count.max(1)), "Upload pyxis contracts")
            .await
    }

    async fn code_checksum(&self, code_id: u64) -> Result<String, ChainError> {
        let value = self
            .abci_query(QUERY_CODE_PATH, QueryCodeRequest { code_id }.encode_to_vec())
            .await?;

        let response = QueryCodeResponse::decode(value.as_slice())?;
        match response.code_info {
            Some(info) if !info.data_hash.is_empty() => Ok(hex::encode(info.data_hash)),
            _ => Err(ChainError::InvalidResponse(format!("no code info for code id {}", code_id))),
        }
    }
}

#[async_trait]
impl AddressDeriver for RpcChainClient {
    async fn derive_smart_account_address(
        &self,
        descriptor: &SmartAccountDescriptor,
    ) -> Result<String, ChainError> {
        let request = messages::generate_account_request(descriptor);
        let value = self
            .abci_query(QUERY_GENERATE_ACCOUNT_PATH, request.encode_to_vec())
            .await?;

        let response = QueryGenerateAccountResponse::decode(value.as_slice())?;
        if response.address.is_empty() {
            return Err(ChainError::InvalidResponse(
                "generate account returned an empty address".to_string(),
            ));
        }
        Ok(response.address)
    }
}
