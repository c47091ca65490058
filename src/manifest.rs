//! Snapshot manifest: the closed-schema description of one snapshot
//!
//! A manifest maps every file in a snapshot to the ordered list of chunk
//! digests whose concatenation reproduces it. Its canonical byte form
//! (see [`crate::canonical`]) is what gets persisted at
//! `store/manifests/<snapshot_id>.json` and what `manifest_hash` commits to:
//! any change to path ordering, key ordering, whitespace or number
//! formatting changes the hash.

use crate::canonical;
use crate::error::Result;
use crate::utils::hash_data;
use serde::{Deserialize, Serialize};

/// One file inside a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    /// Source-relative path with `/` separators
    pub path: String,
    /// Original byte length of the file
    pub size: u64,
    /// Ordered chunk digests; empty for an empty file
    pub chunks: Vec<String>,
}

/// A snapshot's file-to-chunk mapping
///
/// `files` is kept sorted ascending by `path`; [`Manifest::new`] and
/// [`Manifest::parse`] both enforce that, so an in-memory manifest is always
/// in canonical order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// On-disk format version
    pub version: u32,
    /// Snapshot this manifest belongs to
    pub snapshot_id: String,
    /// Absolute source path the snapshot was taken from
    pub source_path: String,
    /// Creation time as fractional unix seconds
    pub created_at: f64,
    /// Operator-provided label (may be empty)
    pub label: String,
    /// File entries, sorted by `path`
    pub files: Vec<FileEntry>,
}

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

impl Manifest {
    /// Build a manifest, sorting `files` into canonical path order.
    pub fn new(
        snapshot_id: String,
        source_path: String,
        created_at: f64,
        label: String,
        mut files: Vec<FileEntry>,
    ) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            version: MANIFEST_VERSION,
            snapshot_id,
            source_path,
            created_at,
            label,
            files,
        }
    }

    /// Serialize to canonical bytes (the persisted form).
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical::to_canonical_bytes(self)
    }

    /// SHA-256 of the canonical byte form.
    pub fn manifest_hash(&self) -> Result<String> {
        Ok(hash_data(&self.to_canonical_bytes()?))
    }

    /// Parse manifest bytes, re-sorting `files` into canonical order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SnapvaultError::Json`] if the bytes are not a
    /// valid manifest document.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut manifest: Manifest = serde_json::from_slice(bytes)?;
        manifest.files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(manifest)
    }

    /// Total number of chunk references across all files.
    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunks.len()).sum()
    }
}
