//! The crate `bridge-relay-types` contains the chain primitives observed by the bridge
//! relay (headers, actions, receipts, names) and the incremental merkle accumulator
//! used to anchor the evidence submitted to the foreign chain.

#![deny(clippy::cast_possible_truncation)]
#![deny(unused_must_use)]

pub mod action;
pub mod blockchain;
pub mod codec;
pub mod merkle;
pub mod primitives;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use primitives::{
    BlockId,
    Bytes32,
    Checksum256,
    Name,
    TransactionId,
};
