//! Merkle root over named file sets
//!
//! [`FileSetTree`] is a thin wrapper around `rs_merkle` that turns a set of
//! `(filename, bytes)` pairs into a single [`ContentHash`]. Leaves are sorted
//! by filename, so insertion order never changes the identity.

use crate::hash::ContentHash;
use rs_merkle::{Hasher, MerkleTree as RsMerkleTree};

/// Merkle tree over the files of one artifact
pub struct FileSetTree {
    inner: RsMerkleTree<Blake3Hasher>,
    names: Vec<String>,
}

impl std::fmt::Debug for FileSetTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSetTree")
            .field("files", &self.names)
            .field("root", &self.root())
            .finish()
    }
}

impl FileSetTree {
    /// Build from `(filename, bytes)` pairs
    #[must_use]
    pub fn from_files<'a, I>(files: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut entries: Vec<(&str, &[u8])> = files.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let leaves: Vec<[u8; 32]> = entries
            .iter()
            .map(|(name, data)| *ContentHash::compute_named(name, data).as_bytes())
            .collect();
        Self {
            inner: RsMerkleTree::from_leaves(&leaves),
            names: entries.iter().map(|(name, _)| (*name).to_string()).collect(),
        }
    }

    /// Root hash of the tree
    ///
    /// Returns zero hash for an empty file set.
    #[inline]
    #[must_use]
    pub fn root(&self) -> ContentHash {
        self.inner.root().map_or_else(ContentHash::default, ContentHash::new)
    }

    /// Number of files
    #[inline]
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.inner.leaves().map_or(0, |leaves| leaves.len())
    }

    /// Leaf hash of the named file, if present
    #[must_use]
    pub fn leaf_for(&self, name: &str) -> Option<ContentHash> {
        let index = self.names.iter().position(|n| n == name)?;
        self.inner
            .leaves()
            .and_then(|leaves| leaves.get(index).map(|bytes| ContentHash::new(*bytes)))
    }
}

/// Blake3 hasher adapter for rs_merkle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    type Hash = [u8; 32];

    #[inline]
    fn hash(data: &[u8]) -> Self::Hash {
        *blake3::hash(data).as_bytes()
    }
}
