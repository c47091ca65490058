//! Error types for the snapvault library
//!
//! All fallible operations return [`Result`]. The error taxonomy mirrors the
//! on-disk integrity model: corruption of stored data, rollback of the
//! snapshot chain, and tampering of the audit log are distinct, structured
//! failures rather than string soup.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the snapvault library
pub type Result<T> = std::result::Result<T, SnapvaultError>;

/// The two distinguishable ways a snapshot chain walk can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackReason {
    /// `prev_root` does not name the predecessor's merkle root, or no
    /// predecessor exists where one is required.
    PreviousSnapshotNotFound,
    /// `chain_hash` does not recompute, or `prev_chain_hash` disagrees with
    /// the predecessor's `chain_hash`.
    HashChainMismatch,
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackReason::PreviousSnapshotNotFound => {
                write!(f, "previous snapshot not found for root")
            }
            RollbackReason::HashChainMismatch => write!(f, "hash chain mismatch"),
        }
    }
}

/// Main error type for all snapvault operations
#[derive(Debug, Error)]
pub enum SnapvaultError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors while parsing the policy table
    #[error("policy error: {0}")]
    Policy(#[from] serde_yaml::Error),

    /// Referenced chunk absent from the store
    #[error("chunk missing: {0}")]
    ChunkMissing(String),

    /// Stored chunk bytes do not hash to their filename
    #[error("chunk corrupted: expected {expected}, actual {actual}")]
    ChunkCorrupted {
        /// Digest the chunk is stored under
        expected: String,
        /// Digest of the bytes actually on disk
        actual: String,
    },

    /// Canonical re-serialization of a stored manifest does not match its
    /// recorded `manifest_hash`
    #[error("manifest corrupted for snapshot {0}")]
    ManifestCorrupted(String),

    /// Recomputed merkle root differs from the recorded one
    #[error("merkle root mismatch: expected {expected}, actual {actual}")]
    MerkleMismatch {
        /// Root recorded in the snapshot record
        expected: String,
        /// Root recomputed from the stored manifest
        actual: String,
    },

    /// A snapshot-chain invariant was violated
    #[error("rollback detected at snapshot {snapshot_id}: {reason}")]
    RollbackDetected {
        /// Snapshot at which the walk failed
        snapshot_id: String,
        /// Which invariant class failed
        reason: RollbackReason,
    },

    /// Snapshot id not present in the ledger
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Policy predicate returned DENY
    #[error("user '{user}' is not allowed to execute command '{command}'")]
    PermissionDenied {
        /// Operator that issued the command
        user: String,
        /// Command that was denied
        command: String,
    },

    /// A journal line failed to parse
    #[error("journal corrupted at line {line}: {content}")]
    JournalCorrupted {
        /// 1-based line number
        line: usize,
        /// The offending line
        content: String,
    },

    /// The audit chain failed to verify
    #[error("audit log corrupted at line {line}: {detail}")]
    AuditCorrupted {
        /// 1-based line number of the first bad entry
        line: usize,
        /// What failed on that line
        detail: String,
    },

    /// The OS user could not be determined
    #[error("cannot determine OS user")]
    UserDiscovery,

    /// Walk directory error during source discovery
    #[error("walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// Store directory is missing required structure
    #[error("store not initialized at path: {0:?}")]
    StoreNotInitialized(PathBuf),

    /// Init was asked to create a store where one already exists
    #[error("store already exists at path: {0:?}")]
    StoreAlreadyExists(PathBuf),

    /// Generic error for unexpected conditions
    #[error("internal error: {0}")]
    Internal(String),
}

impl SnapvaultError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnapvaultError::Internal(msg.into())
    }

    /// Check if this error indicates corruption of stored data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SnapvaultError::ChunkCorrupted { .. }
                | SnapvaultError::ManifestCorrupted(_)
                | SnapvaultError::MerkleMismatch { .. }
                | SnapvaultError::RollbackDetected { .. }
                | SnapvaultError::JournalCorrupted { .. }
                | SnapvaultError::AuditCorrupted { .. }
        )
    }
}
