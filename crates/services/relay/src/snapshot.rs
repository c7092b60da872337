//! Clean-shutdown checkpoint of the relay state.
//!
//! The file holds the magic `BRLY`, a format version byte and then three
//! `postcard` lists (a varint count followed by the records): block records in
//! ledger order, schedule change jobs and deposit jobs in subject block order.
//! They are followed by the optional active producer schedule.
//! A snapshot is consumed by the next start: it is deleted once loaded.

use crate::{
    Error,
    Result,
    job::{
        ActionProofJob,
        ScheduleChangeJob,
    },
    ledger::BlockRecord,
};
use bridge_relay_types::blockchain::ProducerSchedule;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    io,
    path::Path,
};

pub const MAGIC: [u8; 4] = *b"BRLY";
pub const VERSION: u8 = 2;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub blocks: Vec<BlockRecord>,
    pub schedule_jobs: Vec<ScheduleChangeJob>,
    pub action_jobs: Vec<ActionProofJob>,
    pub active_schedule: Option<ProducerSchedule>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
            && self.schedule_jobs.is_empty()
            && self.action_jobs.is_empty()
            && self.active_schedule.is_none()
    }
}

pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let mut bytes = Vec::from(MAGIC);
    bytes.push(VERSION);
    bytes.extend(postcard::to_allocvec(snapshot)?);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    let (magic, rest) = bytes.split_first_chunk::<4>().ok_or(Error::InvalidMagic)?;
    if *magic != MAGIC {
        return Err(Error::InvalidMagic)
    }
    let (version, body) = rest
        .split_first()
        .ok_or(Error::Codec(postcard::Error::DeserializeUnexpectedEnd))?;
    if *version != VERSION {
        return Err(Error::UnsupportedVersion {
            found: *version,
            expected: VERSION,
        })
    }
    let (snapshot, remaining) = postcard::take_from_bytes::<Snapshot>(body)?;
    if !remaining.is_empty() {
        return Err(Error::TrailingBytes(remaining.len()))
    }
    Ok(snapshot)
}

/// Writes `snapshot` to `path`, replacing any previous content.
pub fn write(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, encode(snapshot)?)?;
    tracing::info!(
        "Saved {} blocks, {} schedule change jobs and {} deposit jobs to {}",
        snapshot.blocks.len(),
        snapshot.schedule_jobs.len(),
        snapshot.action_jobs.len(),
        path.display(),
    );
    Ok(())
}

/// Loads and deletes the snapshot at `path`.
///
/// With `purge`, the snapshot is deleted without being read. A missing file
/// yields `None`; a file that cannot be decoded is an error and is kept.
pub fn load(path: &Path, purge: bool) -> Result<Option<Snapshot>> {
    if purge {
        match fs::remove_file(path) {
            Ok(()) => tracing::info!("Purged relay history at {}", path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        return Ok(None)
    }

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let snapshot = decode(&bytes)?;
    fs::remove_file(path)?;
    tracing::info!(
        "Restored {} blocks, {} schedule change jobs and {} deposit jobs from {}",
        snapshot.blocks.len(),
        snapshot.schedule_jobs.len(),
        snapshot.action_jobs.len(),
        path.display(),
    );
    Ok(Some(snapshot))
}
