//! Content-addressed chunk store
//!
//! Chunks are opaque byte slices of at most [`crate::utils::CHUNK_SIZE`]
//! bytes, addressed by their SHA-256 digest and stored under a two-character
//! shard directory:
//!
//! ```text
//! <store>/chunks/<hh>/<hash>       hh = hash[0..2]
//! ```
//!
//! Writes are put-if-absent: identical content is stored once regardless of
//! how many files or snapshots reference it. A chunk becomes visible only
//! through an atomic same-directory rename, so readers never observe a
//! partially written chunk. Chunks are never overwritten and never deleted
//! by normal operations.

use crate::error::{Result, SnapvaultError};
use crate::utils::hash_data;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Content-addressed immutable blob store for file chunks
#[derive(Debug)]
pub struct ChunkStore {
    chunks_dir: PathBuf,
}

impl ChunkStore {
    /// Open a chunk store rooted at `<store>/chunks`, creating the directory
    /// if needed.
    pub fn open(store_root: &Path) -> Result<Self> {
        let chunks_dir = store_root.join("chunks");
        fs::create_dir_all(&chunks_dir)?;
        Ok(Self { chunks_dir })
    }

    /// Sharded path for a digest.
    fn chunk_path(&self, hash: &str) -> PathBuf {
        let (prefix, _) = hash.split_at(2);
        self.chunks_dir.join(prefix).join(hash)
    }

    /// Store chunk bytes under their digest, returning the digest.
    ///
    /// Put-if-absent: if a chunk with this digest already exists the call
    /// returns without writing. Otherwise the bytes are written to a
    /// temporary sibling, fsynced, and renamed into place. Two concurrent
    /// writers of the same digest race benignly — both produce identical
    /// bytes and rename is last-writer-wins.
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = hash_data(bytes);
        let path = self.chunk_path(&hash);

        if path.exists() {
            trace!("chunk {} already present, skipping write", &hash[..8]);
            return Ok(hash);
        }

        let shard_dir = path
            .parent()
            .ok_or_else(|| SnapvaultError::internal("chunk path has no parent"))?;
        fs::create_dir_all(shard_dir)?;

        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &path)?;

        debug!("stored chunk {} ({} bytes)", &hash[..8], bytes.len());
        Ok(hash)
    }

    /// Check whether a chunk exists.
    pub fn has(&self, hash: &str) -> bool {
        self.chunk_path(hash).exists()
    }

    /// Load the complete byte sequence of a chunk.
    ///
    /// # Errors
    ///
    /// - [`SnapvaultError::ChunkMissing`] if no chunk is stored under `hash`
    /// - [`SnapvaultError::Io`] if the read fails
    ///
    /// The returned bytes are the full file content (read to EOF); callers
    /// that verify integrity re-hash them and compare against `hash`.
    pub fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.chunk_path(hash);
        if !path.exists() {
            return Err(SnapvaultError::ChunkMissing(hash.to_string()));
        }
        Ok(fs::read(&path)?)
    }

    /// Load a chunk and verify its bytes hash back to `hash`.
    ///
    /// # Errors
    ///
    /// [`SnapvaultError::ChunkCorrupted`] if the stored bytes do not match
    /// their address, in addition to the [`ChunkStore::get`] errors.
    pub fn get_verified(&self, hash: &str) -> Result<Vec<u8>> {
        let bytes = self.get(hash)?;
        let actual = hash_data(&bytes);
        if actual != hash {
            return Err(SnapvaultError::ChunkCorrupted {
                expected: hash.to_string(),
                actual,
            });
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (ChunkStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (store, _dir) = create_test_store();

        let hash = store.put(b"Hello, World!").unwrap();
        assert_eq!(hash.len(), 64);
        assert!(store.has(&hash));
        assert_eq!(store.get(&hash).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_put_is_idempotent() {
        let (store, dir) = create_test_store();

        let h1 = store.put(b"same bytes").unwrap();
        let h2 = store.put(b"same bytes").unwrap();
        assert_eq!(h1, h2);

        // Exactly one file under the shard tree
        let mut count = 0;
        for shard in fs::read_dir(dir.path().join("chunks")).unwrap() {
            count += fs::read_dir(shard.unwrap().path()).unwrap().count();
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_sharded_layout() {
        let (store, dir) = create_test_store();
        let hash = store.put(b"sharded").unwrap();
        let expected = dir
            .path()
            .join("chunks")
            .join(&hash[..2])
            .join(&hash);
        assert!(expected.exists());
        assert!(!expected.with_extension("tmp").exists());
    }

    #[test]
    fn test_get_missing_chunk() {
        let (store, _dir) = create_test_store();
        let absent = "ab".repeat(32);
        assert!(!store.has(&absent));
        assert!(matches!(
            store.get(&absent),
            Err(SnapvaultError::ChunkMissing(_))
        ));
    }

    #[test]
    fn test_get_verified_detects_flip() {
        let (store, dir) = create_test_store();
        let hash = store.put(b"pristine content").unwrap();

        // Flip one byte on disk
        let path = dir.path().join("chunks").join(&hash[..2]).join(&hash);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0x01;
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            store.get_verified(&hash),
            Err(SnapvaultError::ChunkCorrupted { .. })
        ));
    }
}
