//! Block headers and producer schedules of the host chain.

use crate::{
    codec,
    primitives::{
        BlockId,
        Bytes32,
        Checksum256,
        Name,
        hex_bytes,
    },
};
use serde::{
    Deserialize,
    Serialize,
};

/// Header extension id carrying a new producer schedule.
pub const PRODUCER_SCHEDULE_CHANGE_EXTENSION_ID: u16 = 1;

/// A producer and the key it signs blocks with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerKey {
    pub producer_name: Name,
    #[serde(with = "hex_bytes")]
    pub block_signing_key: Vec<u8>,
}

/// A versioned list of block producers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerSchedule {
    pub version: u32,
    pub producers: Vec<ProducerKey>,
}

impl ProducerSchedule {
    /// SHA-256 of the canonical encoding of the schedule.
    pub fn digest(&self) -> Checksum256 {
        codec::digest(self)
    }
}

/// Opaque header extension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub id: u16,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Extension {
    /// Builds the extension announcing `schedule`.
    pub fn schedule_change(schedule: &ProducerSchedule) -> Self {
        Self {
            id: PRODUCER_SCHEDULE_CHANGE_EXTENSION_ID,
            data: codec::canonical_bytes(schedule),
        }
    }
}

/// The header of a host chain block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block slot, in half seconds since the chain epoch.
    pub timestamp: u32,
    pub producer: Name,
    pub confirmed: u16,
    pub previous: BlockId,
    pub transaction_mroot: Checksum256,
    pub action_mroot: Checksum256,
    pub schedule_version: u32,
    #[serde(default)]
    pub new_producers: Option<ProducerSchedule>,
    #[serde(default)]
    pub header_extensions: Vec<Extension>,
}

impl BlockHeader {
    /// Extracts the block number encoded in a block id.
    pub fn num_from_id(id: &BlockId) -> u32 {
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&id[..4]);
        u32::from_be_bytes(prefix)
    }

    /// The height of this block: one above the block it extends.
    pub fn block_num(&self) -> u32 {
        Self::num_from_id(&self.previous).wrapping_add(1)
    }

    /// SHA-256 of the canonical encoding of the header.
    pub fn digest(&self) -> Bytes32 {
        codec::digest(self)
    }

    /// The block id: the header digest with the block number written over
    /// its first four bytes.
    pub fn id(&self) -> BlockId {
        let mut id = self.digest();
        id[..4].copy_from_slice(&self.block_num().to_be_bytes());
        id
    }

    /// The producer schedule announced by this header, if any.
    pub fn schedule_change(&self) -> Option<ProducerSchedule> {
        if let Some(schedule) = &self.new_producers {
            return Some(schedule.clone())
        }
        self.header_extensions
            .iter()
            .filter(|extension| extension.id == PRODUCER_SCHEDULE_CHANGE_EXTENSION_ID)
            .find_map(|extension| postcard::from_bytes(&extension.data).ok())
    }
}

/// A block header together with its producer signature.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlockHeader {
    pub header: BlockHeader,
    #[serde(with = "hex_bytes")]
    pub producer_signature: Vec<u8>,
}

impl SignedBlockHeader {
    pub fn id(&self) -> BlockId {
        self.header.id()
    }

    pub fn block_num(&self) -> u32 {
        self.header.block_num()
    }
}
