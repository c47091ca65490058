//! Repository orchestration: init, open, backup, restore, verify, list
//!
//! A `Repository` ties the chunk store, the journal, and the metadata ledger
//! together under one store root:
//!
//! ```text
//! <store>/chunks/<hh>/<hash>     content-addressed chunks
//! <store>/manifests/<sid>.json   canonical snapshot manifests
//! <store>/metadata.json          ledger (canonical JSON)
//! <store>/wal.log                write-ahead journal
//! <store>/audit.log              audit chain (written by the command layer)
//! ```
//!
//! ## Durability ordering
//!
//! A backup is a journaled transaction. Chunks are durable before the
//! manifest that references them, the manifest before the ledger record,
//! the ledger before the COMMIT line. A crash anywhere in between leaves an
//! incomplete transaction that [`Repository::open`] rolls back: the ledger
//! record (if any) and the manifest file are removed, chunks are kept —
//! they are content-addressed and may be shared with other snapshots.

use crate::error::{Result, SnapvaultError};
use crate::journal::{Journal, JournalRecord, JournalScan};
use crate::ledger::{chain_hash, Ledger, SnapshotRecord};
use crate::manifest::{FileEntry, Manifest};
use crate::merkle::manifest_root;
use crate::store::ChunkStore;
use crate::utils::{atomic_write, normalize_rel_path, unix_now, CHUNK_SIZE};
use rand::Rng;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result of a restore operation
#[derive(Debug)]
pub struct RestoreReport {
    /// Snapshot that was restored
    pub snapshot_id: String,
    /// Number of files written
    pub files_restored: usize,
    /// Total bytes written
    pub bytes_written: u64,
}

/// Result of a successful verification
#[derive(Debug)]
pub struct VerifyReport {
    /// Snapshot that was verified
    pub snapshot_id: String,
    /// Files checked against the manifest
    pub files_checked: usize,
    /// Chunk references re-hashed
    pub chunks_checked: usize,
}

/// A backup store rooted at one directory
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    chunks: ChunkStore,
    journal: Journal,
    ledger: Ledger,
}

impl Repository {
    /// Create the store skeleton: chunk and manifest directories, an empty
    /// ledger, an empty journal, an empty audit log.
    ///
    /// # Errors
    ///
    /// [`SnapvaultError::StoreAlreadyExists`] if a ledger already exists at
    /// the root.
    pub fn init(root: &Path) -> Result<Self> {
        let metadata_path = root.join("metadata.json");
        if metadata_path.exists() {
            return Err(SnapvaultError::StoreAlreadyExists(root.to_path_buf()));
        }

        fs::create_dir_all(root)?;
        fs::create_dir_all(root.join("manifests"))?;
        let chunks = ChunkStore::open(root)?;
        let journal = Journal::open(root)?;

        let ledger = Ledger::default();
        ledger.save(&metadata_path)?;

        let audit_path = root.join("audit.log");
        if !audit_path.exists() {
            fs::write(&audit_path, b"")?;
        }

        info!("initialized store at {:?}", root);
        Ok(Self {
            root: root.to_path_buf(),
            chunks,
            journal,
            ledger,
        })
    }

    /// Open an existing store and run crash recovery unconditionally.
    ///
    /// # Errors
    ///
    /// [`SnapvaultError::StoreNotInitialized`] if no ledger exists at the
    /// root; recovery errors if the journal cannot be parsed.
    pub fn open(root: &Path) -> Result<Self> {
        let metadata_path = root.join("metadata.json");
        if !metadata_path.exists() {
            return Err(SnapvaultError::StoreNotInitialized(root.to_path_buf()));
        }

        let chunks = ChunkStore::open(root)?;
        let journal = Journal::open(root)?;
        let ledger = Ledger::load(&metadata_path)?;

        let mut repo = Self {
            root: root.to_path_buf(),
            chunks,
            journal,
            ledger,
        };
        repo.recover()?;
        Ok(repo)
    }

    /// Store root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    fn manifest_path(&self, snapshot_id: &str) -> PathBuf {
        self.root.join("manifests").join(format!("{}.json", snapshot_id))
    }

    /// Roll back incomplete transactions, then compact the journal down to
    /// committed lines. Idempotent: a second run after a clean first run
    /// changes nothing.
    fn recover(&mut self) -> Result<()> {
        let JournalScan { incomplete, .. } = self.journal.scan()?;

        for sid in &incomplete {
            warn!("recovering incomplete transaction {}", sid);

            // Defensive: under the commit ordering the ledger should never
            // hold an uncommitted record, but remove it if it does.
            if self.ledger.snapshots.contains_key(sid) {
                self.ledger.remove(sid);
                self.ledger.save(&self.metadata_path())?;
            }

            let manifest_path = self.manifest_path(sid);
            if manifest_path.exists() {
                fs::remove_file(&manifest_path)?;
                debug!("removed orphan manifest {:?}", manifest_path);
            }
            // Chunks stay: content-addressed, possibly shared.
        }

        self.journal.compact()?;
        if !incomplete.is_empty() {
            info!("recovery cleaned {} incomplete transaction(s)", incomplete.len());
        }
        Ok(())
    }

    /// Create a snapshot of `source` and append it to the chain.
    pub fn backup(&mut self, source: &Path, label: &str) -> Result<SnapshotRecord> {
        if !source.is_dir() {
            return Err(SnapvaultError::internal(format!(
                "source path is not a directory: {:?}",
                source
            )));
        }

        let files = discover_files(source)?;
        let snapshot_id = generate_snapshot_id();
        info!(
            "backing up {:?} as {} ({} files)",
            source,
            snapshot_id,
            files.len()
        );

        self.journal.append(&JournalRecord::Begin {
            snapshot_id: snapshot_id.clone(),
        })?;

        let mut entries = Vec::with_capacity(files.len());
        for (rel_path, abs_path) in &files {
            let (chunks, size) = self.chunk_file(abs_path)?;
            entries.push(FileEntry {
                path: rel_path.clone(),
                size,
                chunks,
            });
        }

        let created_at = unix_now();
        let manifest = Manifest::new(
            snapshot_id.clone(),
            source
                .canonicalize()
                .unwrap_or_else(|_| source.to_path_buf())
                .to_string_lossy()
                .to_string(),
            created_at,
            label.to_string(),
            entries,
        );
        let manifest_bytes = manifest.to_canonical_bytes()?;
        let manifest_hash = manifest.manifest_hash()?;

        atomic_write(&self.manifest_path(&snapshot_id), &manifest_bytes)?;
        self.journal.append(&JournalRecord::Manifest {
            manifest_hash: manifest_hash.clone(),
        })?;

        let merkle_root = manifest_root(&manifest);
        let prev_root = self.ledger.latest_root();
        let prev_chain_hash = self.ledger.latest_chain_hash();
        let record = SnapshotRecord {
            id: snapshot_id.clone(),
            created_at,
            label: label.to_string(),
            merkle_root: merkle_root.clone(),
            prev_root: prev_root.clone(),
            prev_chain_hash: prev_chain_hash.clone(),
            chain_hash: chain_hash(&prev_chain_hash, &merkle_root, &prev_root),
            manifest_hash,
            total_files: manifest.files.len() as u64,
            total_chunks: manifest.total_chunks() as u64,
            sequence: self.ledger.prev_root_chain.len() as u64,
        };

        self.journal.append(&JournalRecord::Metadata {
            snapshot_id: snapshot_id.clone(),
            merkle_root: merkle_root.clone(),
            prev_root,
            created_at,
            label: label.to_string(),
        })?;

        self.ledger.append(record.clone())?;
        self.ledger.save(&self.metadata_path())?;

        self.journal.append(&JournalRecord::Commit {
            snapshot_id: snapshot_id.clone(),
        })?;

        info!(
            "snapshot {} committed: {} files, {} chunks, root {}",
            snapshot_id,
            record.total_files,
            record.total_chunks,
            &record.merkle_root[..8]
        );
        Ok(record)
    }

    /// Stream one file into the chunk store, returning its chunk digests
    /// and byte length. An empty file yields an empty chunk list.
    fn chunk_file(&self, path: &Path) -> Result<(Vec<String>, u64)> {
        let mut file = File::open(path)?;
        let mut chunks = Vec::new();
        let mut total: u64 = 0;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let mut filled = 0;
            // A single read may return short; fill up to the chunk boundary.
            while filled < CHUNK_SIZE {
                let n = file.read(&mut buffer[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            chunks.push(self.chunks.put(&buffer[..filled])?);
            total += filled as u64;
            if filled < CHUNK_SIZE {
                break;
            }
        }

        Ok((chunks, total))
    }

    /// Restore a snapshot into `target`, overwriting existing files at the
    /// same relative paths.
    ///
    /// The chain is verified first — a rolled-back chain refuses to restore.
    /// Chunk contents are not re-hashed here; that is [`Repository::verify`]'s
    /// job.
    pub fn restore(&self, snapshot_id: &str, target: &Path) -> Result<RestoreReport> {
        self.ledger.verify_chain(snapshot_id)?;
        let manifest = self.load_manifest(snapshot_id)?;

        fs::create_dir_all(target)?;
        let mut bytes_written: u64 = 0;

        for entry in &manifest.files {
            let dest = target.join(entry.path.replace('/', std::path::MAIN_SEPARATOR_STR));
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut out = File::create(&dest)?;
            for chunk_hash in &entry.chunks {
                let bytes = self.chunks.get(chunk_hash)?;
                out.write_all(&bytes)?;
                bytes_written += bytes.len() as u64;
            }
            out.sync_all()?;
            debug!("restored {} ({} bytes)", entry.path, entry.size);
        }

        info!(
            "restored snapshot {} to {:?}: {} files",
            snapshot_id,
            target,
            manifest.files.len()
        );
        Ok(RestoreReport {
            snapshot_id: snapshot_id.to_string(),
            files_restored: manifest.files.len(),
            bytes_written,
        })
    }

    /// Full integrity verification of one snapshot.
    ///
    /// Checks, in order: the manifest hash against the stored canonical
    /// bytes, every chunk's presence and content hash, the recomputed merkle
    /// root, and the snapshot hash chain.
    pub fn verify(&self, snapshot_id: &str) -> Result<VerifyReport> {
        let record = self.ledger.get(snapshot_id)?;
        let manifest = match self.load_manifest(snapshot_id) {
            Ok(m) => m,
            // Unparseable bytes are corruption of the stored manifest
            Err(SnapvaultError::Json(_)) => {
                return Err(SnapvaultError::ManifestCorrupted(snapshot_id.to_string()));
            }
            Err(e) => return Err(e),
        };

        let recomputed_hash = manifest.manifest_hash()?;
        if recomputed_hash != record.manifest_hash {
            return Err(SnapvaultError::ManifestCorrupted(snapshot_id.to_string()));
        }

        let mut chunks_checked = 0;
        for entry in &manifest.files {
            for chunk_hash in &entry.chunks {
                if !self.chunks.has(chunk_hash) {
                    return Err(SnapvaultError::ChunkMissing(chunk_hash.clone()));
                }
                self.chunks.get_verified(chunk_hash)?;
                chunks_checked += 1;
            }
        }

        let root = manifest_root(&manifest);
        if root != record.merkle_root {
            return Err(SnapvaultError::MerkleMismatch {
                expected: record.merkle_root.clone(),
                actual: root,
            });
        }

        self.ledger.verify_chain(snapshot_id)?;

        info!("snapshot {} verified OK", snapshot_id);
        Ok(VerifyReport {
            snapshot_id: snapshot_id.to_string(),
            files_checked: manifest.files.len(),
            chunks_checked,
        })
    }

    /// Snapshot records in `sequence` order.
    pub fn list(&self) -> Vec<SnapshotRecord> {
        self.ledger.list().into_iter().cloned().collect()
    }

    /// Look up one snapshot record.
    pub fn get(&self, snapshot_id: &str) -> Result<SnapshotRecord> {
        self.ledger.get(snapshot_id).cloned()
    }

    fn load_manifest(&self, snapshot_id: &str) -> Result<Manifest> {
        let path = self.manifest_path(snapshot_id);
        if !path.exists() {
            return Err(SnapvaultError::SnapshotNotFound(snapshot_id.to_string()));
        }
        Manifest::parse(&fs::read(&path)?)
    }
}

/// Snapshot id: `snap_<unix_seconds>_<8 random hex>`.
fn generate_snapshot_id() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let suffix: u32 = rand::thread_rng().gen();
    format!("snap_{}_{:08x}", secs, suffix)
}

/// Discover regular files beneath `source`, sorted by their forward-slash
/// relative path. Symlinks and non-regular files are skipped; directories
/// are not entities of their own.
fn discover_files(source: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| SnapvaultError::internal("walked path escaped source root"))?;
        files.push((normalize_rel_path(rel)?, entry.path().to_path_buf()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
