// Protobuf messages submitted by the deployer and the Aura smart-account types
// that cosmos-sdk-proto does not ship

use cosmos_sdk_proto::cosmos::bank::v1beta1::MsgSend;
use cosmos_sdk_proto::cosmos::base::v1beta1::Coin as ProtoCoin;
use cosmos_sdk_proto::cosmos::crypto::secp256k1::PubKey;
use cosmos_sdk_proto::cosmwasm::wasm::v1::{MsgExecuteContract, MsgInstantiateContract, MsgStoreCode};
use cosmos_sdk_proto::Any;
use prost::Message;

use super::{ChainError, Coin};
use crate::account::SmartAccountDescriptor;

pub const SECP256K1_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";
pub const BASE_ACCOUNT_TYPE_URL: &str = "/cosmos.auth.v1beta1.BaseAccount";
pub const SMART_ACCOUNT_TYPE_URL: &str = "/aura.smartaccount.v1beta1.SmartAccount";
pub const MSG_SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";
pub const MSG_STORE_CODE_TYPE_URL: &str = "/cosmwasm.wasm.v1.MsgStoreCode";
pub const MSG_INSTANTIATE_CONTRACT_TYPE_URL: &str = "/cosmwasm.wasm.v1.MsgInstantiateContract";
pub const MSG_EXECUTE_CONTRACT_TYPE_URL: &str = "/cosmwasm.wasm.v1.MsgExecuteContract";
pub const MSG_ACTIVATE_ACCOUNT_TYPE_URL: &str = "/aura.smartaccount.v1beta1.MsgActivateAccount";
pub const MSG_RECOVER_TYPE_URL: &str = "/aura.smartaccount.v1beta1.MsgRecover";

pub const QUERY_ACCOUNT_PATH: &str = "/cosmos.auth.v1beta1.Query/Account";
pub const QUERY_GENERATE_ACCOUNT_PATH: &str = "/aura.smartaccount.v1beta1.Query/GenerateAccount";
pub const QUERY_CODE_PATH: &str = "/cosmwasm.wasm.v1.Query/Code";

/// Activates a funded smart-account address by instantiating its contract
#[derive(Clone, PartialEq, Message)]
pub struct MsgActivateAccount {
    #[prost(string, tag = "1")]
    pub account_address: String,
    #[prost(uint64, tag = "2")]
    pub code_id: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub salt: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub init_msg: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub pub_key: Option<Any>,
}

/// Replaces a smart account's public key, authorised by its recovery plugin
#[derive(Clone, PartialEq, Message)]
pub struct MsgRecover {
    #[prost(string, tag = "1")]
    pub creator: String,
    #[prost(string, tag = "2")]
    pub address: String,
    #[prost(message, optional, tag = "3")]
    pub public_key: Option<Any>,
    #[prost(string, tag = "4")]
    pub credentials: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryGenerateAccountRequest {
    #[prost(uint64, tag = "1")]
    pub code_id: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub salt: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub init_msg: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub public_key: Option<Any>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryGenerateAccountResponse {
    #[prost(string, tag = "1")]
    pub address: String,
}

/// Account type stored by x/smartaccount once an address is activated
#[derive(Clone, PartialEq, Message)]
pub struct SmartAccount {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(message, optional, tag = "2")]
    pub pub_key: Option<Any>,
    #[prost(uint64, tag = "3")]
    pub account_number: u64,
    #[prost(uint64, tag = "4")]
    pub sequence: u64,
}

fn to_any<M: Message>(type_url: &str, msg: &M) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: msg.encode_to_vec(),
    }
}

fn proto_coins(coins: &[Coin]) -> Vec<ProtoCoin> {
    coins
        .iter()
        .map(|c| ProtoCoin {
            denom: c.denom.clone(),
            amount: c.amount.to_string(),
        })
        .collect()
}

/// `PubKey` wrapped in `Any`, the form signer infos and smart-account messages carry
pub fn public_key_any(public_key: &[u8]) -> Any {
    to_any(
        SECP256K1_PUBKEY_TYPE_URL,
        &PubKey {
            key: public_key.to_vec(),
        },
    )
}

pub fn msg_send(from: &str, to: &str, amount: &[Coin]) -> Any {
    to_any(
        MSG_SEND_TYPE_URL,
        &MsgSend {
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount: proto_coins(amount),
        },
    )
}

pub fn msg_store_code(sender: &str, wasm: Vec<u8>) -> Any {
    to_any(
        MSG_STORE_CODE_TYPE_URL,
        &MsgStoreCode {
            sender: sender.to_string(),
            wasm_byte_code: wasm,
            ..Default::default()
        },
    )
}

pub fn msg_instantiate_contract(
    sender: &str,
    admin: Option<&str>,
    code_id: u64,
    label: &str,
    init_payload: &serde_json::Value,
    funds: &[Coin],
) -> Result<Any, ChainError> {
    Ok(to_any(
        MSG_INSTANTIATE_CONTRACT_TYPE_URL,
        &MsgInstantiateContract {
            sender: sender.to_string(),
            admin: admin.unwrap_or_default().to_string(),
            code_id,
            label: label.to_string(),
            msg: serde_json::to_vec(init_payload)?,
            funds: proto_coins(funds),
        },
    ))
}

pub fn msg_execute_contract<T: serde::Serialize>(
    sender: &str,
    contract: &str,
    msg: &T,
    funds: &[Coin],
) -> Result<Any, ChainError> {
    Ok(to_any(
        MSG_EXECUTE_CONTRACT_TYPE_URL,
        &MsgExecuteContract {
            sender: sender.to_string(),
            contract: contract.to_string(),
            msg: serde_json::to_vec(msg)?,
            funds: proto_coins(funds),
        },
    ))
}

pub fn msg_activate_account(descriptor: &SmartAccountDescriptor, account_address: &str) -> Any {
    to_any(
        MSG_ACTIVATE_ACCOUNT_TYPE_URL,
        &MsgActivateAccount {
            account_address: account_address.to_string(),
            code_id: descriptor.code_id,
            salt: descriptor.salt.clone(),
            init_msg: descriptor.init_payload.clone(),
            pub_key: Some(public_key_any(&descriptor.public_key)),
        },
    )
}

pub fn msg_recover(creator: &str, account_address: &str, new_public_key: &[u8], credentials: &str) -> Any {
    to_any(
        MSG_RECOVER_TYPE_URL,
        &MsgRecover {
            creator: creator.to_string(),
            address: account_address.to_string(),
            public_key: Some(public_key_any(new_public_key)),
            credentials: credentials.to_string(),
        },
    )
}

pub fn generate_account_request(descriptor: &SmartAccountDescriptor) -> QueryGenerateAccountRequest {
    QueryGenerateAccountRequest {
        code_id: descriptor.code_id,
        salt: descriptor.salt.clone(),
        init_msg: descriptor.init_payload.clone(),
        public_key: Some(public_key_any(&descriptor.public_key)),
    }
}
