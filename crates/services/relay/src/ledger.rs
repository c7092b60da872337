//! Bounded store of recently finalized blocks.

use crate::ports::FinalizedBlock;
use bridge_relay_types::{
    BlockId,
    Checksum256,
    blockchain::SignedBlockHeader,
    merkle::IncrementalMerkle,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    HashMap,
    VecDeque,
};

/// A finalized block as remembered by the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: BlockId,
    pub number: u32,
    pub previous: BlockId,
    pub action_root: Checksum256,
    /// Merkle of the ids of every block before this one.
    pub cumulative_merkle: IncrementalMerkle,
    pub raw: SignedBlockHeader,
    pub has_schedule_change: bool,
}

impl From<FinalizedBlock> for BlockRecord {
    fn from(block: FinalizedBlock) -> Self {
        let FinalizedBlock {
            id,
            block_num,
            header,
            blockroot_merkle,
        } = block;
        Self {
            id,
            number: block_num,
            previous: header.header.previous,
            action_root: header.header.action_mroot,
            cumulative_merkle: blockroot_merkle,
            has_schedule_change: header.header.schedule_change().is_some(),
            raw: header,
        }
    }
}

/// Insertion-ordered block records, unique by id, holding at most
/// `capacity` entries. Recording past capacity evicts the earliest inserted
/// record, whatever its block number.
#[derive(Debug)]
pub struct BlockLedger {
    capacity: usize,
    records: HashMap<BlockId, BlockRecord>,
    order: VecDeque<BlockId>,
}

impl BlockLedger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts `block`. Returns `false` if a record with the same id is
    /// already present, in which case nothing changes.
    pub fn record(&mut self, block: BlockRecord) -> bool {
        if self.records.contains_key(&block.id) {
            return false
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.records.remove(&evicted);
            }
        }
        self.order.push_back(block.id);
        self.records.insert(block.id, block);
        true
    }

    pub fn get(&self, id: &BlockId) -> Option<&BlockRecord> {
        self.records.get(id)
    }

    /// Follows `previous` links `steps` times starting at `id`.
    ///
    /// Returns `None` when any block on the way is no longer retained.
    pub fn ancestor(&self, id: &BlockId, steps: usize) -> Option<&BlockRecord> {
        let mut current = self.get(id)?;
        for _ in 0..steps {
            current = self.get(&current.previous)?;
        }
        Some(current)
    }

    /// Number of the earliest inserted record still retained.
    pub fn oldest_number(&self) -> Option<u32> {
        self.order
            .front()
            .and_then(|id| self.records.get(id))
            .map(|record| record.number)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }
}
