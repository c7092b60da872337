//! Binary merkle trees in the host chain's canonical form.
//!
//! Nodes are combined with [`hash_pair`]: the left child has the top bit of its
//! first byte cleared, the right child has it set, and the parent is the
//! SHA-256 of their concatenation. A level with an odd number of nodes pairs
//! its last node with itself.
//!
//! [`IncrementalMerkle`] keeps only the nodes needed to keep appending, so the
//! relay can carry the cumulative merkle of the block id history in every
//! block record. [`merkle_root`] and [`inclusion_path`] work over a complete
//! leaf list.

use crate::{
    codec,
    primitives::Bytes32,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[non_exhaustive]
pub enum MerkleError {
    #[display(fmt = "leaf index {index} is out of range for {len} leaves")]
    InvalidIndex { index: usize, len: usize },
    #[display(fmt = "expected {expected} leaves, got {actual}")]
    LeafCountMismatch { expected: u64, actual: usize },
    #[display(
        fmt = "{active_nodes} active nodes are inconsistent with {node_count} appended leaves"
    )]
    InconsistentState { node_count: u64, active_nodes: usize },
}

impl core::error::Error for MerkleError {}

/// Clears the top bit of the first byte, marking the digest as a left child.
pub fn make_canonical_left(digest: &Bytes32) -> Bytes32 {
    let mut canonical = *digest;
    canonical[0] &= 0x7f;
    canonical
}

/// Sets the top bit of the first byte, marking the digest as a right child.
pub fn make_canonical_right(digest: &Bytes32) -> Bytes32 {
    let mut canonical = *digest;
    canonical[0] |= 0x80;
    canonical
}

pub fn is_canonical_right(digest: &Bytes32) -> bool {
    digest[0] & 0x80 != 0
}

/// Parent of two nodes.
pub fn hash_pair(left: &Bytes32, right: &Bytes32) -> Bytes32 {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(make_canonical_left(left).as_slice());
    bytes[32..].copy_from_slice(make_canonical_right(right).as_slice());
    codec::sha256(&bytes)
}

fn next_level(level: &mut Vec<Bytes32>) {
    if level.len() % 2 == 1 {
        if let Some(last) = level.last().copied() {
            level.push(last);
        }
    }
    *level = level
        .chunks_exact(2)
        .map(|pair| hash_pair(&pair[0], &pair[1]))
        .collect();
}

/// Computes the root over the complete leaf list. The root of an empty list
/// is the zero digest.
pub fn merkle_root(leaves: &[Bytes32]) -> Bytes32 {
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        next_level(&mut level);
    }
    level.first().copied().unwrap_or_default()
}

/// Returns the siblings on the way from `leaves[index]` to the root.
///
/// Each sibling is already canonicalized, so its top bit tells on which side
/// it joins the path. A single leaf has an empty path.
pub fn inclusion_path(index: usize, leaves: &[Bytes32]) -> Result<Vec<Bytes32>, MerkleError> {
    if index >= leaves.len() {
        return Err(MerkleError::InvalidIndex {
            index,
            len: leaves.len(),
        })
    }

    let mut path = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        let sibling = &level[position ^ 1];
        if position % 2 == 0 {
            path.push(make_canonical_right(sibling));
        } else {
            path.push(make_canonical_left(sibling));
        }
        next_level(&mut level);
        position /= 2;
    }
    Ok(path)
}

/// Folds an inclusion path back into the root it proves.
pub fn root_from_path(leaf: &Bytes32, path: &[Bytes32]) -> Bytes32 {
    path.iter().fold(*leaf, |node, sibling| {
        if is_canonical_right(sibling) {
            hash_pair(&node, sibling)
        } else {
            hash_pair(sibling, &node)
        }
    })
}

/// Number of tree levels needed to hold `node_count` leaves.
fn max_depth(node_count: u64) -> u32 {
    if node_count == 0 {
        return 0
    }
    let width_bits = node_count
        .checked_next_power_of_two()
        .map_or(u64::BITS, u64::trailing_zeros);
    width_bits.saturating_add(1)
}

fn expected_active_nodes(node_count: u64) -> usize {
    let ones = node_count.count_ones() as usize;
    if node_count == 0 || node_count.is_power_of_two() {
        ones
    } else {
        ones.saturating_add(1)
    }
}

/// An append-only merkle accumulator.
///
/// `active_nodes` holds, bottom up, the left nodes still waiting for a right
/// sibling, followed by the current root once the tree is not perfect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIncrementalMerkle")]
pub struct IncrementalMerkle {
    node_count: u64,
    active_nodes: Vec<Bytes32>,
}

#[derive(Deserialize)]
struct RawIncrementalMerkle {
    node_count: u64,
    active_nodes: Vec<Bytes32>,
}

impl TryFrom<RawIncrementalMerkle> for IncrementalMerkle {
    type Error = MerkleError;

    fn try_from(raw: RawIncrementalMerkle) -> Result<Self, Self::Error> {
        Self::from_parts(raw.node_count, raw.active_nodes)
    }
}

impl IncrementalMerkle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores an accumulator, checking that the active nodes match the leaf count.
    pub fn from_parts(
        node_count: u64,
        active_nodes: Vec<Bytes32>,
    ) -> Result<Self, MerkleError> {
        if active_nodes.len() != expected_active_nodes(node_count) {
            return Err(MerkleError::InconsistentState {
                node_count,
                active_nodes: active_nodes.len(),
            })
        }
        Ok(Self {
            node_count,
            active_nodes,
        })
    }

    pub fn from_leaves<'a>(leaves: impl IntoIterator<Item = &'a Bytes32>) -> Self {
        let mut merkle = Self::new();
        for leaf in leaves {
            merkle.append(*leaf);
        }
        merkle
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn active_nodes(&self) -> &[Bytes32] {
        &self.active_nodes
    }

    /// The current root, or the zero digest when nothing was appended.
    pub fn root(&self) -> Bytes32 {
        self.active_nodes.last().copied().unwrap_or_default()
    }

    /// Appends a leaf and returns the new root.
    pub fn append(&mut self, leaf: Bytes32) -> Bytes32 {
        let mut partial = false;
        let mut depth = max_depth(self.node_count.saturating_add(1)).saturating_sub(1);
        let mut index = self.node_count;
        let mut top = leaf;
        let mut active = self.active_nodes.iter();
        let mut updated = Vec::with_capacity(expected_active_nodes(
            self.node_count.saturating_add(1),
        ));

        while depth > 0 {
            if index & 1 == 1 {
                // `top` is a right child: its left sibling is the next active node.
                let left = active.next().copied().unwrap_or_default();
                if partial {
                    updated.push(left);
                }
                top = hash_pair(&left, &top);
            } else {
                // `top` is a left child without a sibling yet.
                if !partial {
                    updated.push(top);
                }
                top = hash_pair(&top, &top);
                partial = true;
            }
            depth = depth.saturating_sub(1);
            index >>= 1;
        }

        updated.push(top);
        self.active_nodes = updated;
        self.node_count = self.node_count.saturating_add(1);
        top
    }

    /// Inclusion path of `leaves[index]`, where `leaves` is every leaf appended
    /// to this accumulator.
    pub fn inclusion_path(
        &self,
        index: usize,
        leaves: &[Bytes32],
    ) -> Result<Vec<Bytes32>, MerkleError> {
        if leaves.len() as u64 != self.node_count {
            return Err(MerkleError::LeafCountMismatch {
                expected: self.node_count,
                actual: leaves.len(),
            })
        }
        inclusion_path(index, leaves)
    }
}
