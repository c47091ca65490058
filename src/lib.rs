//! # snapvault - Verifiable directory backups
//!
//! A backup engine that captures directory snapshots into a local
//! content-addressed store and restores them bit-identically, with
//! cryptographic detection of corruption, omission and rollback.
//!
//! ## Overview
//!
//! snapvault stores data as fixed-size chunks addressed by SHA-256, so
//! identical content is stored once across files and snapshots. Each
//! snapshot is described by a canonical JSON manifest whose bytes are
//! deterministic and hashable; a Merkle tree over the manifest's file
//! entries yields a single root that commits to every path and chunk in the
//! snapshot. Snapshot records form a hash chain — each record commits to its
//! predecessor's merkle root and chain hash — which makes replacing a newer
//! record with an older one detectable. Backups run as write-ahead-journaled
//! transactions, so a crash at any point leaves a store that recovers to the
//! last committed snapshot on the next open. Every command invocation lands
//! in an append-only, hash-chained audit log.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snapvault::Repository;
//! use std::path::Path;
//!
//! # fn main() -> snapvault::Result<()> {
//! let mut repo = Repository::init(Path::new("./store"))?;
//! let record = repo.backup(Path::new("./project"), "initial")?;
//! println!("snapshot {} root {}", record.id, record.merkle_root);
//!
//! repo.verify(&record.id)?;
//! repo.restore(&record.id, Path::new("./restored"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module organization
//!
//! - [`store`]: content-addressed chunk store
//! - [`manifest`]: canonical snapshot manifests
//! - [`merkle`]: Merkle tree over manifest entries
//! - [`journal`]: write-ahead journal and transaction framing
//! - [`ledger`]: hash-chained snapshot records and rollback detection
//! - [`audit`]: append-only audit chain
//! - [`policy`]: role-based command policy
//! - [`repository`]: backup/restore/verify orchestration
//! - [`canonical`]: deterministic JSON serialization
//! - [`error`]: error types
//! - [`utils`]: hashing, durable writes, contract constants

pub mod audit;
pub mod canonical;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod manifest;
pub mod merkle;
pub mod policy;
pub mod repository;
pub mod store;
pub mod utils;

pub use audit::{AuditLog, AuditStatus};
pub use error::{Result, RollbackReason, SnapvaultError};
pub use ledger::{Ledger, SnapshotRecord};
pub use manifest::{FileEntry, Manifest};
pub use policy::Policy;
pub use repository::{Repository, RestoreReport, VerifyReport};
pub use store::ChunkStore;
pub use utils::{CHUNK_SIZE, ZERO_DIGEST};
