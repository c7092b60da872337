//! Implementations of the relay ports used by the binary.

pub mod feed;
pub mod json_rpc;
