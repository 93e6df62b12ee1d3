//! MIB persistence across restarts.
//!
//! The whole MIB (scalars, key rows and the key-derivation counter) is
//! written as one MessagePack document with named fields.

use crate::table::KeyRow;
use keyshare_types::value::Instance;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Everything needed to rebuild the MIB after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MibSnapshot {
    /// Scalar block in insertion order.
    pub scalars: Vec<(String, Instance)>,
    /// Key rows in insertion order.
    pub rows: Vec<KeyRow>,
    /// Key-derivation counter at the time of the snapshot.
    pub key_counter: u64,
}

/// Errors raised while reading or writing a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Snapshot decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Invalid snapshot: {0}")]
    Invalid(String),
}

/// Write `snapshot` to `path`, replacing any previous file atomically.
pub fn save_snapshot(path: &Path, snapshot: &MibSnapshot) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let bytes = rmp_serde::to_vec_named(snapshot)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    info!(
        path = %path.display(),
        rows = snapshot.rows.len(),
        bytes = bytes.len(),
        "MIB snapshot saved"
    );
    Ok(())
}

/// Read a snapshot. A missing file is not an error and yields `None`.
pub fn load_snapshot(path: &Path) -> Result<Option<MibSnapshot>, SnapshotError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No MIB snapshot found");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let snapshot: MibSnapshot = rmp_serde::from_slice(&bytes)?;
    Ok(Some(snapshot))
}
