// In-memory chain used by the workflow tests.
//
// Verifies real signatures, enforces sequences, balances and fees, and models
// smart-account activation, plugin registration and key recovery.

use async_trait::async_trait;
use bech32::{ToBase32, Variant};
use cosmos_sdk_proto::cosmos::bank::v1beta1::MsgSend;
use cosmos_sdk_proto::cosmos::crypto::secp256k1::PubKey;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{AuthInfo, SignDoc, TxBody, TxRaw};
use cosmos_sdk_proto::cosmwasm::wasm::v1::MsgExecuteContract;
use cosmos_sdk_proto::Any;
use prost::Message;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{AccountActivationWorkflow, SignerIdentity, WorkflowContext};
use crate::account::{RecoveryConfig, SmartAccountDescriptor, SmartAccountExecuteMsg};
use crate::chain::messages::{
    MsgActivateAccount, MsgRecover, MSG_ACTIVATE_ACCOUNT_TYPE_URL, MSG_EXECUTE_CONTRACT_TYPE_URL,
    MSG_RECOVER_TYPE_URL, MSG_SEND_TYPE_URL,
};
use crate::chain::{
    tx_hash, AddressDeriver, ChainClient, ChainError, Coin, InstantiateOptions, InstantiateResult,
    LocalSigner, SignContext, TxEvent, TxResult,
};
use crate::config::{ChainEndpointProfile, GasLimits};
use crate::keystore::CosmosKey;

pub(crate) const CHAIN_ID: &str = "local-aura";
pub(crate) const PREFIX: &str = "aura";
pub(crate) const DENOM: &str = "uaura";

/// What the next broadcast does instead of reporting inclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BroadcastFault {
    /// Applied on chain, but the caller sees a timeout
    TimeoutAfterInclusion,
    /// Never applied, and the caller sees a timeout
    TimeoutWithoutInclusion,
    /// Applied on chain, and the caller's wait never finishes
    HangAfterInclusion,
    /// Held in the mempool with a timeout reported; lands right after the next lookup of its hash
    LandAfterLookup,
    /// Held in the mempool with a timeout reported; lands just before the next broadcast
    LandBeforeNextBroadcast,
}

struct HeldTx {
    hash: String,
    tx_bytes: Vec<u8>,
    release: BroadcastFault,
}

#[derive(Debug, Clone, Default)]
struct MockAccount {
    account_number: u64,
    sequence: u64,
    balance: u128,
    public_key: Option<Vec<u8>>,
    smart: bool,
    plugins: HashMap<String, Value>,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, MockAccount>,
    next_account_number: u64,
    next_code_id: u64,
    height: u64,
    txs: HashMap<String, TxResult>,
    allowed_plugins: HashSet<String>,
    codes: HashMap<u64, String>,
    contracts: HashMap<String, u64>,
    faults: VecDeque<BroadcastFault>,
    held: Vec<HeldTx>,
    broadcasts: Vec<String>,
}

type Failure = (String, u32, String);

fn fail(codespace: &str, code: u32, log: impl Into<String>) -> Failure {
    (codespace.to_string(), code, log.into())
}

impl MockState {
    fn account_mut(&mut self, address: &str) -> &mut MockAccount {
        let next_account_number = &mut self.next_account_number;
        self.accounts.entry(address.to_string()).or_insert_with(|| {
            *next_account_number += 1;
            MockAccount {
                account_number: *next_account_number,
                ..Default::default()
            }
        })
    }
}

pub(crate) struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_code_id: 723,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn credit(&self, address: &str, amount: u128) {
        self.lock().account_mut(address).balance += amount;
    }

    pub(crate) fn allow_plugin(&self, plugin_address: &str) {
        self.lock().allowed_plugins.insert(plugin_address.to_string());
    }

    /// Pretend `checksum` was stored under `code_id` by an earlier upload
    pub(crate) fn add_code(&self, code_id: u64, checksum: &str) {
        self.lock().codes.insert(code_id, checksum.to_string());
    }

    pub(crate) fn is_plugin_allowed(&self, plugin_address: &str) -> bool {
        self.lock().allowed_plugins.contains(plugin_address)
    }

    pub(crate) fn inject_fault(&self, fault: BroadcastFault) {
        self.lock().faults.push_back(fault);
    }

    pub(crate) fn balance(&self, address: &str) -> u128 {
        self.lock().accounts.get(address).map(|a| a.balance).unwrap_or_default()
    }

    pub(crate) fn is_activated(&self, address: &str) -> bool {
        self.lock().accounts.get(address).map(|a| a.smart).unwrap_or_default()
    }

    pub(crate) fn authorized_key(&self, address: &str) -> Option<Vec<u8>> {
        self.lock().accounts.get(address).and_then(|a| a.public_key.clone())
    }

    pub(crate) fn plugins(&self, address: &str) -> Vec<String> {
        let state = self.lock();
        let mut plugins: Vec<String> = state
            .accounts
            .get(address)
            .map(|a| a.plugins.keys().cloned().collect())
            .unwrap_or_default();
        plugins.sort();
        plugins
    }

    /// Hashes of every transaction handed to `broadcast`, in order
    pub(crate) fn broadcasts(&self) -> Vec<String> {
        self.lock().broadcasts.clone()
    }

    pub(crate) fn derive(descriptor: &SmartAccountDescriptor) -> Result<String, ChainError> {
        let mut hasher = Sha256::new();
        hasher.update(descriptor.code_id.to_be_bytes());
        for part in [&descriptor.salt, &descriptor.init_payload, &descriptor.public_key] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        bech32::encode(PREFIX, hasher.finalize().to_base32(), Variant::Bech32)
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    fn check_tx(state: &mut MockState, tx_bytes: &[u8]) -> Result<(TxBody, String), Failure> {
        let tx = TxRaw::decode(tx_bytes).map_err(|e| fail("sdk", 2, e.to_string()))?;
        let body = TxBody::decode(tx.body_bytes.as_slice()).map_err(|e| fail("sdk", 2, e.to_string()))?;
        let auth_info =
            AuthInfo::decode(tx.auth_info_bytes.as_slice()).map_err(|e| fail("sdk", 2, e.to_string()))?;

        let first = body.messages.first().ok_or_else(|| fail("sdk", 2, "empty tx"))?;
        let signer_address = signer_of(first).map_err(|log| fail("sdk", 2, log))?;
        let activation = match first.type_url.as_str() {
            MSG_ACTIVATE_ACCOUNT_TYPE_URL => Some(
                MsgActivateAccount::decode(first.value.as_slice()).map_err(|e| fail("sdk", 2, e.to_string()))?,
            ),
            _ => None,
        };

        let signer_info = auth_info
            .signer_infos
            .first()
            .ok_or_else(|| fail("sdk", 4, "no signer info"))?;
        let public_key = signer_info
            .public_key
            .as_ref()
            .and_then(|any| PubKey::decode(any.value.as_slice()).ok())
            .map(|pk| pk.key)
            .ok_or_else(|| fail("sdk", 8, "missing pubkey"))?;

        let account = state
            .accounts
            .get(&signer_address)
            .cloned()
            .ok_or_else(|| fail("sdk", 9, format!("account {} not found", signer_address)))?;

        if signer_info.sequence != account.sequence {
            return Err(fail(
                "sdk",
                32,
                format!(
                    "account sequence mismatch, expected {}, got {}: incorrect account sequence",
                    account.sequence, signer_info.sequence
                ),
            ));
        }

        let key_ok = if account.smart {
            account.public_key.as_deref() == Some(public_key.as_slice())
        } else if let Some(msg) = &activation {
            msg.pub_key
                .as_ref()
                .and_then(|any| PubKey::decode(any.value.as_slice()).ok())
                .map(|pk| pk.key == public_key)
                .unwrap_or(false)
        } else {
            crate::keystore::address_from_public_key(&public_key, PREFIX).ok().as_deref()
                == Some(signer_address.as_str())
        };
        if !key_ok {
            return Err(fail(
                "sdk",
                4,
                format!("signature verification failed; pubkey does not match signer {}", signer_address),
            ));
        }

        let sign_doc = SignDoc {
            body_bytes: tx.body_bytes.clone(),
            auth_info_bytes: tx.auth_info_bytes.clone(),
            chain_id: CHAIN_ID.to_string(),
            account_number: account.account_number,
        };
        let digest = Sha256::digest(sign_doc.encode_to_vec());
        if !verify_signature(&digest, tx.signatures.first().map(Vec::as_slice).unwrap_or_default(), &public_key) {
            return Err(fail(
                "sdk",
                4,
                format!(
                    "signature verification failed; please verify account number ({}) and chain-id ({})",
                    account.account_number, CHAIN_ID
                ),
            ));
        }

        let fee: u128 = auth_info
            .fee
            .as_ref()
            .map(|f| {
                f.amount
                    .iter()
                    .filter(|c| c.denom == DENOM)
                    .map(|c| c.amount.parse::<u128>().unwrap_or_default())
                    .sum()
            })
            .unwrap_or_default();
        if account.balance < fee {
            return Err(fail(
                "sdk",
                5,
                format!("{}{} is smaller than {}{}: insufficient funds", account.balance, DENOM, fee, DENOM),
            ));
        }

        let account = state.account_mut(&signer_address);
        account.balance -= fee;
        account.sequence += 1;

        Ok((body, signer_address))
    }

    fn execute(state: &mut MockState, msg: &Any) -> Result<Vec<TxEvent>, Failure> {
        match msg.type_url.as_str() {
            MSG_SEND_TYPE_URL => {
                let send = MsgSend::decode(msg.value.as_slice()).map_err(|e| fail("sdk", 2, e.to_string()))?;
                let amount: u128 = send
                    .amount
                    .iter()
                    .filter(|c| c.denom == DENOM)
                    .map(|c| c.amount.parse::<u128>().unwrap_or_default())
                    .sum();
                let balance = state.accounts.get(&send.from_address).map(|a| a.balance).unwrap_or_default();
                if balance < amount {
                    return Err(fail(
                        "sdk",
                        5,
                        format!("{}{} is smaller than {}{}: insufficient funds", balance, DENOM, amount, DENOM),
                    ));
                }
                state.account_mut(&send.from_address).balance -= amount;
                state.account_mut(&send.to_address).balance += amount;
                Ok(vec![event("transfer", &[("recipient", &send.to_address), ("amount", &format!("{}{}", amount, DENOM))])])
            }
            MSG_ACTIVATE_ACCOUNT_TYPE_URL => {
                let activate =
                    MsgActivateAccount::decode(msg.value.as_slice()).map_err(|e| fail("sdk", 2, e.to_string()))?;
                let public_key = activate
                    .pub_key
                    .as_ref()
                    .and_then(|any| PubKey::decode(any.value.as_slice()).ok())
                    .map(|pk| pk.key)
                    .unwrap_or_default();
                let descriptor = SmartAccountDescriptor {
                    code_id: activate.code_id,
                    salt: activate.salt.clone(),
                    init_payload: activate.init_msg.clone(),
                    public_key: public_key.clone(),
                };
                let derived = Self::derive(&descriptor).map_err(|e| fail("smartaccount", 2, e.to_string()))?;
                if derived != activate.account_address {
                    return Err(fail("smartaccount", 2, "account address mismatch: invalid smart account"));
                }

                let account = state.account_mut(&activate.account_address);
                if account.smart {
                    return Err(fail("smartaccount", 3, "smart account already activated"));
                }
                account.smart = true;
                account.public_key = Some(public_key);
                Ok(vec![event("instantiate", &[("_contract_address", &activate.account_address)])])
            }
            MSG_EXECUTE_CONTRACT_TYPE_URL => {
                let exec =
                    MsgExecuteContract::decode(msg.value.as_slice()).map_err(|e| fail("sdk", 2, e.to_string()))?;
                let parsed: SmartAccountExecuteMsg = serde_json::from_slice(&exec.msg)
                    .map_err(|e| fail("wasm", 5, format!("execute wasm contract failed: {}", e)))?;
                if exec.sender != exec.contract {
                    return Err(fail("wasm", 5, "execute wasm contract failed: unauthorized"));
                }
                let allowed = state.allowed_plugins.clone();
                let account = state
                    .accounts
                    .get_mut(&exec.contract)
                    .filter(|a| a.smart)
                    .ok_or_else(|| fail("wasm", 5, "execute wasm contract failed: no such contract"))?;

                match parsed {
                    SmartAccountExecuteMsg::RegisterPlugin {
                        plugin_address, config, ..
                    } => {
                        if !allowed.contains(&plugin_address) {
                            return Err(fail("wasm", 5, "execute wasm contract failed: plugin is not allowed"));
                        }
                        if account.plugins.contains_key(&plugin_address) {
                            return Err(fail("wasm", 5, "execute wasm contract failed: plugin already registered"));
                        }
                        let config: Value = serde_json::from_str(&config)
                            .map_err(|e| fail("wasm", 5, format!("execute wasm contract failed: {}", e)))?;
                        account.plugins.insert(plugin_address.clone(), config);
                        Ok(vec![event("wasm", &[("action", "register_plugin"), ("plugin_address", &plugin_address)])])
                    }
                    SmartAccountExecuteMsg::UnregisterPlugin { plugin_address } => {
                        if account.plugins.remove(&plugin_address).is_none() {
                            return Err(fail("wasm", 5, "execute wasm contract failed: plugin not found"));
                        }
                        Ok(vec![event("wasm", &[("action", "unregister_plugin"), ("plugin_address", &plugin_address)])])
                    }
                }
            }
            MSG_RECOVER_TYPE_URL => {
                let recover = MsgRecover::decode(msg.value.as_slice()).map_err(|e| fail("sdk", 2, e.to_string()))?;
                let new_key = recover
                    .public_key
                    .as_ref()
                    .and_then(|any| PubKey::decode(any.value.as_slice()).ok())
                    .map(|pk| pk.key)
                    .ok_or_else(|| fail("smartaccount", 5, "invalid public key"))?;

                let account = state
                    .accounts
                    .get_mut(&recover.address)
                    .filter(|a| a.smart)
                    .ok_or_else(|| fail("smartaccount", 6, format!("smart account {} not activated", recover.address)))?;

                let authorized = account.plugins.values().any(|config| {
                    serde_json::from_value::<RecoveryConfig>(config.clone())
                        .map(|c| c.recover_address == recover.creator && c.smart_account_address == recover.address)
                        .unwrap_or(false)
                });
                if !authorized {
                    return Err(fail("smartaccount", 7, "recovery not allowed: no recovery plugin accepts the caller"));
                }

                account.public_key = Some(new_key);
                Ok(vec![event("smartaccount_recover", &[("address", &recover.address)])])
            }
            other => Err(fail("sdk", 2, format!("unsupported message {}", other))),
        }
    }

    fn deliver(&self, tx_bytes: &[u8]) -> Result<TxResult, ChainError> {
        let hash = tx_hash(tx_bytes);
        let mut state = self.lock();

        let (body, _signer) = Self::check_tx(&mut state, tx_bytes).map_err(|(codespace, code, log)| {
            ChainError::Rejected {
                tx_hash: hash.clone(),
                codespace,
                code,
                log,
            }
        })?;

        // Messages run against a copy so a failing message leaves no trace
        let snapshot = state.accounts.clone();
        let mut events = Vec::new();
        let mut failure = None;
        for msg in &body.messages {
            match Self::execute(&mut state, msg) {
                Ok(mut evs) => events.append(&mut evs),
                Err(f) => {
                    failure = Some(f);
                    break;
                }
            }
        }

        if failure.is_some() {
            // the fee and sequence bump from check_tx stay
            state.accounts = snapshot;
        }

        state.height += 1;
        let result = TxResult {
            tx_hash: hash.clone(),
            height: state.height,
            code: 0,
            codespace: String::new(),
            gas_used: 100_000,
            raw_log: String::new(),
            events,
        };
        let result = match failure {
            None => result,
            Some((codespace, code, log)) => TxResult {
                code,
                codespace,
                raw_log: log,
                events: Vec::new(),
                ..result
            },
        };

        state.txs.insert(hash, result.clone());
        result.into_result()
    }

    fn signed_context(&self, address: &str) -> Result<SignContext, ChainError> {
        let state = self.lock();
        let account = state
            .accounts
            .get(address)
            .ok_or_else(|| ChainError::AccountNotFound(address.to_string()))?;
        Ok(SignContext {
            chain_id: CHAIN_ID.to_string(),
            account_number: account.account_number,
            sequence: account.sequence,
        })
    }
}

fn event(event_type: &str, attributes: &[(&str, &str)]) -> TxEvent {
    TxEvent {
        event_type: event_type.to_string(),
        attributes: attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn signer_of(msg: &Any) -> Result<String, String> {
    let address = match msg.type_url.as_str() {
        MSG_SEND_TYPE_URL => MsgSend::decode(msg.value.as_slice()).map(|m| m.from_address),
        MSG_ACTIVATE_ACCOUNT_TYPE_URL => MsgActivateAccount::decode(msg.value.as_slice()).map(|m| m.account_address),
        MSG_EXECUTE_CONTRACT_TYPE_URL => MsgExecuteContract::decode(msg.value.as_slice()).map(|m| m.sender),
        MSG_RECOVER_TYPE_URL => MsgRecover::decode(msg.value.as_slice()).map(|m| m.creator),
        other => return Err(format!("unsupported message {}", other)),
    };
    address.map_err(|e| e.to_string())
}

fn verify_signature(digest: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let secp = secp256k1::Secp256k1::verification_only();
    let (Ok(message), Ok(signature), Ok(public_key)) = (
        secp256k1::Message::from_digest_slice(digest),
        secp256k1::ecdsa::Signature::from_compact(signature),
        secp256k1::PublicKey::from_slice(public_key),
    ) else {
        return false;
    };
    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<String, ChainError> {
        Ok(CHAIN_ID.to_string())
    }

    async fn get_sign_context(&self, address: &str) -> Result<SignContext, ChainError> {
        self.signed_context(address)
    }

    async fn broadcast(&self, tx_bytes: Vec<u8>) -> Result<TxResult, ChainError> {
        let hash = tx_hash(&tx_bytes);
        let (fault, released) = {
            let mut state = self.lock();
            state.broadcasts.push(hash.clone());
            let (released, held) = std::mem::take(&mut state.held)
                .into_iter()
                .partition::<Vec<_>, _>(|h| h.release == BroadcastFault::LandBeforeNextBroadcast);
            state.held = held;
            (state.faults.pop_front(), released)
        };
        for held in released {
            let _ = self.deliver(&held.tx_bytes);
        }

        let timeout = ChainError::BroadcastTimeout {
            tx_hash: hash,
            timeout_ms: 50,
        };
        match fault {
            None => self.deliver(&tx_bytes),
            Some(BroadcastFault::TimeoutWithoutInclusion) => Err(timeout),
            Some(BroadcastFault::TimeoutAfterInclusion) => {
                let _ = self.deliver(&tx_bytes);
                Err(timeout)
            }
            Some(BroadcastFault::HangAfterInclusion) => {
                let _ = self.deliver(&tx_bytes);
                std::future::pending::<Result<TxResult, ChainError>>().await
            }
            Some(release) => {
                self.lock().held.push(HeldTx {
                    hash: tx_hash(&tx_bytes),
                    tx_bytes,
                    release,
                });
                Err(timeout)
            }
        }
    }

    async fn get_tx(&self, tx_hash: &str) -> Result<Option<TxResult>, ChainError> {
        let (found, released) = {
            let mut state = self.lock();
            let found = state.txs.get(tx_hash).cloned();
            let released = state
                .held
                .iter()
                .position(|h| h.hash == tx_hash && h.release == BroadcastFault::LandAfterLookup)
                .map(|index| state.held.remove(index));
            (found, released)
        };
        if let Some(held) = released {
            let _ = self.deliver(&held.tx_bytes);
        }
        Ok(found)
    }

    async fn send_tokens(&self, from: &str, to: &str, amount: u128, denom: &str) -> Result<TxResult, ChainError> {
        let mut state = self.lock();
        let send = MsgSend {
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount: vec![cosmos_sdk_proto::cosmos::base::v1beta1::Coin {
                denom: denom.to_string(),
                amount: amount.to_string(),
            }],
        };
        let msg = Any {
            type_url: MSG_SEND_TYPE_URL.to_string(),
            value: send.encode_to_vec(),
        };
        state.height += 1;
        let height = state.height;
        let events = Self::execute(&mut state, &msg).map_err(|(codespace, code, log)| ChainError::Rejected {
            tx_hash: String::new(),
            codespace,
            code,
            log,
        })?;
        Ok(TxResult {
            tx_hash: tx_hash(&msg.value),
            height,
            code: 0,
            codespace: String::new(),
            gas_used: 80_000,
            raw_log: String::new(),
            events,
        })
    }

    async fn instantiate_contract(
        &self,
        sender: &str,
        code_id: u64,
        init_payload: &Value,
        label: &str,
        _funds: Vec<Coin>,
        _options: InstantiateOptions,
    ) -> Result<InstantiateResult, ChainError> {
        let mut state = self.lock();
        state.height += 1;
        let seed = format!("{}/{}/{}/{}/{}", sender, code_id, label, init_payload, state.height);
        let contract_address = bech32::encode(PREFIX, Sha256::digest(seed.as_bytes()).to_base32(), Variant::Bech32)
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        state.contracts.insert(contract_address.clone(), code_id);

        Ok(InstantiateResult {
            tx: TxResult {
                tx_hash: tx_hash(seed.as_bytes()),
                height: state.height,
                code: 0,
                codespace: String::new(),
                gas_used: 200_000,
                raw_log: String::new(),
                events: vec![event("instantiate", &[("_contract_address", &contract_address), ("code_id", &code_id.to_string())])],
            },
            contract_address,
        })
    }

    async fn store_code(&self, _sender: &str, wasm_modules: Vec<Vec<u8>>) -> Result<TxResult, ChainError> {
        let mut state = self.lock();
        state.height += 1;
        let mut events = Vec::new();
        for wasm in &wasm_modules {
            let code_id = state.next_code_id;
            state.next_code_id += 1;
            let checksum = hex::encode(Sha256::digest(wasm));
            events.push(event(
                "store_code",
                &[("code_checksum", &checksum), ("code_id", &code_id.to_string())],
            ));
            state.codes.insert(code_id, checksum);
        }

        Ok(TxResult {
            tx_hash: tx_hash(&wasm_modules.concat()),
            height: state.height,
            code: 0,
            codespace: String::new(),
            gas_used: 1_000_000,
            raw_log: String::new(),
            events,
        })
    }

    async fn execute_contract(
        &self,
        _sender: &str,
        contract: &str,
        msg: &Value,
        _funds: Vec<Coin>,
    ) -> Result<TxResult, ChainError> {
        let mut state = self.lock();
        state.height += 1;
        let hash = tx_hash(format!("{}/{}/{}", contract, msg, state.height).as_bytes());
        let reject = |log: String| ChainError::Rejected {
            tx_hash: hash.clone(),
            codespace: "wasm".to_string(),
            code: 5,
            log,
        };

        if !state.contracts.contains_key(contract) {
            return Err(reject(format!("no such contract: {}", contract)));
        }
        let mut events = Vec::new();
        if let Some(info) = msg.get("allow_plugin").map(|m| &m["plugin_info"]) {
            let address = info["address"].as_str().unwrap_or_default().to_string();
            if state.contracts.get(&address).copied() != info["code_id"].as_u64() {
                return Err(reject("Invalid plugin code_id".to_string()));
            }
            state.allowed_plugins.insert(address.clone());
            events.push(event("wasm", &[("action", "allow_plugin"), ("plugin_address", &address)]));
        }

        Ok(TxResult {
            tx_hash: hash,
            height: state.height,
            code: 0,
            codespace: String::new(),
            gas_used: 150_000,
            raw_log: String::new(),
            events,
        })
    }

    async fn code_checksum(&self, code_id: u64) -> Result<String, ChainError> {
        self.lock()
            .codes
            .get(&code_id)
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse(format!("no code info for code id {}", code_id)))
    }
}

#[async_trait]
impl AddressDeriver for MockChain {
    async fn derive_smart_account_address(&self, descriptor: &SmartAccountDescriptor) -> Result<String, ChainError> {
        Self::derive(descriptor)
    }
}

/// Deterministic test key; `seed` must be non-zero
pub(crate) fn test_key(seed: u8) -> CosmosKey {
    CosmosKey::from_private_key(vec![seed; 32], PREFIX).unwrap()
}

pub(crate) fn identity(seed: u8) -> SignerIdentity {
    let key = test_key(seed);
    let address = key.address.clone();
    let public_key = key.public_key.clone();
    SignerIdentity::new(&address, public_key, Arc::new(LocalSigner::new(key)))
}

pub(crate) fn test_profile() -> ChainEndpointProfile {
    ChainEndpointProfile {
        rpc_endpoint: "http://localhost:26657".to_string(),
        address_prefix: PREFIX.to_string(),
        fee_denom: DENOM.to_string(),
        chain_id: CHAIN_ID.to_string(),
        broadcast_timeout_ms: 50,
        broadcast_poll_interval_ms: 10,
        gas_price: "0.025".to_string(),
        average_block_time_ms: 10,
        rpc_override_env: None,
    }
}

pub(crate) fn test_workflow() -> AccountActivationWorkflow {
    AccountActivationWorkflow::new(&test_profile(), GasLimits::default())
}

/// Mock chain plus a context whose funder holds `funds`
pub(crate) fn setup(funder_seed: u8, funds: u128) -> (Arc<MockChain>, WorkflowContext) {
    let chain = Arc::new(MockChain::new());
    let funder = identity(funder_seed);
    chain.credit(funder.address(), funds);
    let ctx = WorkflowContext::new(chain.clone(), chain.clone(), funder);
    (chain, ctx)
}
