//! Bridge relay service.
//!
//! Watches finalized blocks of the host chain, opens a proof job for every
//! producer schedule change and every deposit into the bridge account, grows
//! each job's header window until the foreign chain can verify it, and submits
//! the evidence on a timer until the foreign chain accepts it.

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]
#![deny(unused_must_use)]

pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod ledger;
pub mod ports;
pub mod relay;
pub mod service;
pub mod snapshot;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::Config;
pub use error::{
    Error,
    Result,
};
pub use service::{
    Service,
    SharedState,
    new_service,
};
