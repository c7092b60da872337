//! Actions, their receipts and execution traces.

use crate::{
    codec,
    primitives::{
        Checksum256,
        Name,
        hex_bytes,
    },
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub actor: Name,
    pub permission: Name,
}

/// A contract call: `account::name(data)` authorized by `authorization`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub account: Name,
    pub name: Name,
    pub authorization: Vec<PermissionLevel>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Action {
    /// Digest of the action, as referenced by `ActionReceipt::act_digest`.
    pub fn digest(&self) -> Checksum256 {
        codec::digest(self)
    }

    /// Decodes the action payload.
    pub fn decode_data<T>(&self) -> Result<T, postcard::Error>
    where
        T: DeserializeOwned,
    {
        postcard::from_bytes(&self.data)
    }
}

/// Proof that an action was executed by `receiver`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub receiver: Name,
    pub act_digest: Checksum256,
    pub global_sequence: u64,
    pub recv_sequence: u64,
    pub auth_sequence: Vec<(Name, u64)>,
    pub code_sequence: u32,
    pub abi_sequence: u32,
}

impl ActionReceipt {
    /// The leaf committed into the block's `action_mroot`.
    pub fn digest(&self) -> Checksum256 {
        codec::digest(self)
    }
}

/// Execution trace of a single action inside a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTrace {
    pub action_ordinal: u32,
    pub receiver: Name,
    pub act: Action,
    #[serde(default)]
    pub receipt: Option<ActionReceipt>,
    pub block_num: u32,
    /// Set when the action failed.
    #[serde(default)]
    pub except: Option<String>,
}

/// A token amount: `amount` units of the symbol packed in `symbol`
/// (precision in the low byte, ticker in the upper bytes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub amount: i64,
    pub symbol: u64,
}

/// Payload of the token contract's `transfer` action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Name,
    pub to: Name,
    pub quantity: Asset,
    pub memo: String,
}
