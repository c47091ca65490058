//! Utility functions for snapvault
//!
//! Hashing helpers, the on-disk contract constants, durable file writes,
//! path normalization and OS-user discovery. Everything here is shared by
//! more than one component; nothing here knows about store layout.

use crate::error::{Result, SnapvaultError};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::trace;

/// Fixed chunk size: 1 MiB. A contract constant — changing it changes every
/// chunk digest and therefore every manifest hash.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// The 64-character all-zero digest used as the genesis sentinel for both
/// the snapshot chain and the audit chain.
pub const ZERO_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash arbitrary data using SHA-256
///
/// Returns the digest as a lowercase 64-character hexadecimal string. This is
/// the single hashing primitive behind chunk addressing, manifest hashes,
/// merkle nodes and both hash chains.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Atomic, durable file write (write to temp sibling, fsync, rename, fsync dir)
///
/// Either the entire file is visible at `path` or the previous content is.
/// The parent directory is fsynced after the rename so the new directory
/// entry survives a crash.
///
/// # Errors
///
/// - [`SnapvaultError::Io`] if any filesystem operation fails
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    fsync_dir(path.parent().unwrap_or_else(|| Path::new(".")))?;

    trace!("atomically wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Fsync a directory so renames inside it are durable.
pub fn fsync_dir(dir: &Path) -> Result<()> {
    let handle = File::open(dir)?;
    handle.sync_all()?;
    Ok(())
}

/// Append a line to a log file, then flush and fsync.
///
/// Used by the journal and the audit log: a line that this function returned
/// `Ok` for is on stable storage before the caller takes its next step.
pub fn append_line_durable(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// Convert a source-relative path to the manifest's forward-slash form.
///
/// The manifest path separator is `/` on every host; this is a contract
/// constant, not a platform preference.
pub fn normalize_rel_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::Normal(c) => {
                let s = c
                    .to_str()
                    .ok_or_else(|| {
                        SnapvaultError::internal(format!("non-UTF-8 path component in {:?}", path))
                    })?
                    .to_string();
                parts.push(s);
            }
            other => {
                return Err(SnapvaultError::internal(format!(
                    "unexpected path component {:?} in {:?}",
                    other, path
                )));
            }
        }
    }
    Ok(parts.join("/"))
}

/// Determine the operating user for policy and audit purposes.
///
/// Preference order: `SUDO_USER` (the invoking user behind sudo), then
/// `USER`, then `USERNAME`. Fails with [`SnapvaultError::UserDiscovery`]
/// if none yields a non-empty name.
pub fn current_user() -> Result<String> {
    for var in ["SUDO_USER", "USER", "USERNAME"] {
        if let Ok(name) = std::env::var(var) {
            if !name.trim().is_empty() {
                return Ok(name);
            }
        }
    }
    Err(SnapvaultError::UserDiscovery)
}

/// Current wall-clock time as fractional unix seconds.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Current wall-clock time in unix milliseconds (audit timestamps).
pub fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
