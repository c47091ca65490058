//! Metadata ledger: the hash-chained snapshot record store
//!
//! The ledger is the authority on which snapshots exist and in what order.
//! Every record commits to its predecessor twice over: `prev_root` names the
//! predecessor's merkle root, and `chain_hash` folds the predecessor's
//! `chain_hash` into this record's own identity:
//!
//! ```text
//! chain_hash = SHA256(prev_chain_hash || merkle_root || prev_root)
//! ```
//!
//! Replacing a newer record with an older one, deleting a record from the
//! middle, or reordering records all break at least one link, which is what
//! [`Ledger::verify_chain`] detects. The genesis record points at the `ZERO`
//! sentinel on both links.
//!
//! The ledger is persisted as canonical JSON at `store/metadata.json`; every
//! write goes through a temp file and an atomic rename.

use crate::canonical;
use crate::error::{Result, RollbackReason, SnapvaultError};
use crate::utils::{atomic_write, hash_data, ZERO_DIGEST};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Derive a record's `chain_hash` from its links.
///
/// String concatenation of the three hex digests, UTF-8 encoded, then
/// SHA-256 — the exact preimage is contractual.
pub fn chain_hash(prev_chain_hash: &str, merkle_root: &str, prev_root: &str) -> String {
    hash_data(format!("{}{}{}", prev_chain_hash, merkle_root, prev_root).as_bytes())
}

/// One snapshot's entry in the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    /// Snapshot id, `snap_<unix_seconds>_<8 hex>`
    pub id: String,
    /// Creation time, fractional unix seconds
    pub created_at: f64,
    /// Operator-provided label
    pub label: String,
    /// Merkle root over the snapshot's manifest
    pub merkle_root: String,
    /// Predecessor's merkle root, or ZERO for the genesis record
    pub prev_root: String,
    /// Predecessor's chain hash, or ZERO for the genesis record
    pub prev_chain_hash: String,
    /// This record's chain hash (see [`chain_hash`])
    pub chain_hash: String,
    /// SHA-256 of the canonical manifest bytes
    pub manifest_hash: String,
    /// Number of files in the snapshot
    pub total_files: u64,
    /// Number of chunk references in the snapshot
    pub total_chunks: u64,
    /// Dense zero-based insertion counter
    pub sequence: u64,
}

/// The persisted ledger document
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    /// All snapshot records, keyed by id
    pub snapshots: BTreeMap<String, SnapshotRecord>,
    /// Merkle roots in sequence order — the authoritative ordering
    pub prev_root_chain: Vec<String>,
    /// Id of the most recent snapshot
    pub latest_snapshot: Option<String>,
    /// Merkle root of the most recent snapshot
    pub latest_snapshot_root: Option<String>,
}

impl Ledger {
    /// Load the ledger from `path`, or an empty ledger if the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Ledger::default());
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist the ledger canonically via temp file + atomic rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = canonical::to_canonical_bytes(self)?;
        atomic_write(path, &bytes)?;
        debug!("persisted ledger with {} snapshots", self.snapshots.len());
        Ok(())
    }

    /// The chain hash the next record must name as `prev_chain_hash`.
    pub fn latest_chain_hash(&self) -> String {
        self.latest_snapshot
            .as_ref()
            .and_then(|id| self.snapshots.get(id))
            .map(|r| r.chain_hash.clone())
            .unwrap_or_else(|| ZERO_DIGEST.to_string())
    }

    /// The merkle root the next record must name as `prev_root`.
    pub fn latest_root(&self) -> String {
        self.latest_snapshot_root
            .clone()
            .unwrap_or_else(|| ZERO_DIGEST.to_string())
    }

    /// Append a record, checking the chain preconditions.
    ///
    /// Preconditions (violations are internal errors — the orchestrator
    /// derives records from this ledger, so a mismatch means a bug, not
    /// operator input):
    /// - `sequence` equals the current chain length
    /// - `prev_root` equals [`Ledger::latest_root`]
    /// - `prev_chain_hash` equals [`Ledger::latest_chain_hash`]
    /// - `chain_hash` derives correctly
    pub fn append(&mut self, record: SnapshotRecord) -> Result<()> {
        if record.sequence != self.prev_root_chain.len() as u64 {
            return Err(SnapvaultError::internal(format!(
                "sequence {} does not extend chain of length {}",
                record.sequence,
                self.prev_root_chain.len()
            )));
        }
        if record.prev_root != self.latest_root() {
            return Err(SnapvaultError::internal(
                "prev_root does not match latest snapshot root",
            ));
        }
        if record.prev_chain_hash != self.latest_chain_hash() {
            return Err(SnapvaultError::internal(
                "prev_chain_hash does not match latest chain hash",
            ));
        }
        let derived = chain_hash(&record.prev_chain_hash, &record.merkle_root, &record.prev_root);
        if record.chain_hash != derived {
            return Err(SnapvaultError::internal("chain_hash does not derive"));
        }

        self.prev_root_chain.push(record.merkle_root.clone());
        self.latest_snapshot = Some(record.id.clone());
        self.latest_snapshot_root = Some(record.merkle_root.clone());
        info!("appended snapshot {} at sequence {}", record.id, record.sequence);
        self.snapshots.insert(record.id.clone(), record);
        Ok(())
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Result<&SnapshotRecord> {
        self.snapshots
            .get(id)
            .ok_or_else(|| SnapvaultError::SnapshotNotFound(id.to_string()))
    }

    /// All records ordered by `sequence`.
    pub fn list(&self) -> Vec<&SnapshotRecord> {
        let mut records: Vec<&SnapshotRecord> = self.snapshots.values().collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Remove a record and rebuild the derived chain state.
    ///
    /// Used only by crash recovery, for transactions that reached the ledger
    /// but never committed. Normal operation never removes records.
    pub fn remove(&mut self, id: &str) {
        if self.snapshots.remove(id).is_none() {
            return;
        }
        let mut ordered: Vec<(u64, String, String)> = self
            .snapshots
            .values()
            .map(|r| (r.sequence, r.id.clone(), r.merkle_root.clone()))
            .collect();
        ordered.sort_by_key(|t| t.0);
        self.prev_root_chain = ordered.iter().map(|t| t.2.clone()).collect();
        self.latest_snapshot = ordered.last().map(|t| t.1.clone());
        self.latest_snapshot_root = ordered.last().map(|t| t.2.clone());
    }

    /// Walk the chain from genesis through the sequence of `id`, failing
    /// with [`SnapvaultError::RollbackDetected`] on the first violated
    /// invariant.
    ///
    /// Two sub-conditions are distinguished ([`RollbackReason`]):
    /// - *previous snapshot not found for root* — `prev_root` disagrees with
    ///   the predecessor's merkle root (or the dense ordering is broken,
    ///   including `prev_root == ZERO` past genesis)
    /// - *hash chain mismatch* — `chain_hash` does not recompute or
    ///   `prev_chain_hash` disagrees with the predecessor
    pub fn verify_chain(&self, id: &str) -> Result<()> {
        let target = self.get(id)?;
        let ordered = self.list();

        let rollback = |snapshot_id: &str, reason: RollbackReason| {
            Err(SnapvaultError::RollbackDetected {
                snapshot_id: snapshot_id.to_string(),
                reason,
            })
        };

        for i in 0..=target.sequence {
            let i = i as usize;
            let record = match ordered.get(i) {
                Some(r) if r.sequence == i as u64 => *r,
                // Gap or truncation in the dense sequence
                _ => {
                    return rollback(id, RollbackReason::PreviousSnapshotNotFound);
                }
            };

            // The chain list is the authoritative ordering
            if self.prev_root_chain.get(i) != Some(&record.merkle_root) {
                return rollback(&record.id, RollbackReason::PreviousSnapshotNotFound);
            }

            if i == 0 {
                if record.prev_root != ZERO_DIGEST {
                    return rollback(&record.id, RollbackReason::PreviousSnapshotNotFound);
                }
                if record.prev_chain_hash != ZERO_DIGEST {
                    return rollback(&record.id, RollbackReason::HashChainMismatch);
                }
            } else {
                let prev = ordered[i - 1];
                if record.prev_root != prev.merkle_root {
                    return rollback(&record.id, RollbackReason::PreviousSnapshotNotFound);
                }
                if record.prev_chain_hash != prev.chain_hash {
                    return rollback(&record.id, RollbackReason::HashChainMismatch);
                }
            }

            let derived =
                chain_hash(&record.prev_chain_hash, &record.merkle_root, &record.prev_root);
            if record.chain_hash != derived {
                return rollback(&record.id, RollbackReason::HashChainMismatch);
            }
        }

        Ok(())
    }
}
