//! The canonical binary encoding used for hashing chain objects.
//!
//! Every digest computed by the relay (header ids, receipt digests, merkle
//! nodes) goes through this module, so the foreign chain can reproduce them by
//! re-encoding the same values with `postcard`.

use crate::primitives::Bytes32;
use serde::Serialize;
use sha2::{
    Digest,
    Sha256,
};

/// Encodes `value` with the canonical encoding.
pub fn canonical_bytes<T>(value: &T) -> Vec<u8>
where
    T: Serialize + ?Sized,
{
    // The chain types only contain integers, byte strings, sequences and
    // options, which `postcard` always encodes into a growable buffer.
    postcard::to_allocvec(value).expect("Encoding a chain type into a `Vec` is infallible")
}

/// SHA-256 of raw bytes.
pub fn sha256(bytes: &[u8]) -> Bytes32 {
    let hash: [u8; 32] = Sha256::digest(bytes).into();
    Bytes32::new(hash)
}

/// SHA-256 of the canonical encoding of `value`.
pub fn digest<T>(value: &T) -> Bytes32
where
    T: Serialize + ?Sized,
{
    sha256(&canonical_bytes(value))
}
