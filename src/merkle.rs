//! Merkle tree over manifest file entries
//!
//! Each file entry contributes one leaf; the root commits to every path and
//! every chunk digest in the snapshot. Tamper with any chunk list or rename
//! any path and the root moves.
//!
//! ## Tree shape
//!
//! ```text
//!        root
//!       /    \
//!   H(a,b)  H(c,c)     <- odd leaf duplicated
//!   /    \    |
//!  L(a) L(b) L(c)
//! ```
//!
//! Leaves are taken in manifest order (path-sorted). The leaf for a file is
//! `SHA256(path || "|" || chunks.join(","))`; an empty chunk list hashes
//! `path || "|"`. An empty manifest has the `ZERO` sentinel as its root.

use crate::manifest::{FileEntry, Manifest};
use crate::utils::{hash_data, ZERO_DIGEST};
use tracing::trace;

/// Delimiter between the path and the chunk list in a leaf preimage.
const LEAF_DELIMITER: &str = "|";

/// Compute the leaf hash for a single file entry.
pub fn leaf_hash(entry: &FileEntry) -> String {
    let preimage = format!("{}{}{}", entry.path, LEAF_DELIMITER, entry.chunks.join(","));
    hash_data(preimage.as_bytes())
}

/// Compute the Merkle root over a list of leaf hashes.
///
/// - empty list: the `ZERO` sentinel
/// - one leaf: the leaf itself
/// - otherwise: repeatedly pair adjacent hashes (duplicating the last when
///   the level is odd) and hash the concatenated hex strings
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return ZERO_DIGEST.to_string();
    }

    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(hash_data(format!("{}{}", left, right).as_bytes()));
        }
        level = next;
    }

    level.pop().expect("non-empty level has a root")
}

/// Compute the Merkle root of a manifest.
pub fn manifest_root(manifest: &Manifest) -> String {
    let leaves: Vec<String> = manifest.files.iter().map(leaf_hash).collect();
    let root = merkle_root(&leaves);
    trace!(
        "computed merkle root over {} leaves: {}",
        leaves.len(),
        &root[..8.min(root.len())]
    );
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn entry(path: &str, chunks: Vec<&str>) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size: 0,
            chunks: chunks.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn test_empty_manifest_root_is_zero() {
        assert_eq!(merkle_root(&[]), ZERO_DIGEST);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaf = leaf_hash(&entry("a.txt", vec!["aa"]));
        assert_eq!(merkle_root(&[leaf.clone()]), leaf);
    }

    #[test]
    fn test_leaf_preimage_format() {
        let e = entry("dir/f.bin", vec!["c1", "c2"]);
        assert_eq!(leaf_hash(&e), hash_data(b"dir/f.bin|c1,c2"));

        let empty = entry("empty.txt", vec![]);
        assert_eq!(leaf_hash(&empty), hash_data(b"empty.txt|"));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let a = leaf_hash(&entry("a", vec![]));
        let b = leaf_hash(&entry("b", vec![]));
        let c = leaf_hash(&entry("c", vec![]));

        let ab = hash_data(format!("{}{}", a, b).as_bytes());
        let cc = hash_data(format!("{}{}", c, c).as_bytes());
        let expected = hash_data(format!("{}{}", ab, cc).as_bytes());

        assert_eq!(merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn test_root_moves_when_chunk_list_changes() {
        let m1 = Manifest::new(
            "snap_1_00000000".into(),
            "/s".into(),
            1.0,
            String::new(),
            vec![entry("a", vec!["c1"]), entry("b", vec!["c2"])],
        );
        let mut m2 = m1.clone();
        m2.files[1].chunks[0] = "c3".to_string();

        assert_ne!(manifest_root(&m1), manifest_root(&m2));
    }

    #[test]
    fn test_root_depends_on_leaf_order() {
        let a = leaf_hash(&entry("a", vec![]));
        let b = leaf_hash(&entry("b", vec![]));
        assert_ne!(
            merkle_root(&[a.clone(), b.clone()]),
            merkle_root(&[b, a])
        );
    }
}
