//! FLEUR input artifact foundation
//!
//! Typed, content-addressed, immutable artifacts plus the store that keeps
//! them and the provenance records that link them.
//!
//! # Core Concepts
//!
//! - [`Artifact<T>`]: immutable container for typed content, identified by hash
//! - [`ArtifactType`]: trait describing one kind of stored data
//! - [`ContentHash`]: 32-byte Blake3 hash for content addressing
//! - [`FileSetTree`]: Merkle root over a named file set
//! - [`ArtifactStore`]: write-once store with provenance records
//!
//! # Example
//!
//! ```rust,ignore
//! use fleurinp_artifact::{Artifact, ArtifactStore};
//!
//! let store = ArtifactStore::new();
//! let hash = store.insert(Artifact::<FleurinpArtifact>::new(data)?)?;
//! let same = store.get::<FleurinpArtifact>(&hash)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod hash;
mod merkle;
mod store;

pub use artifact::{Artifact, ArtifactError, ArtifactType, NodeRef};
pub use hash::{ContentHash, HashError};
pub use merkle::{Blake3Hasher, FileSetTree};
pub use store::{ArtifactStore, ProvenanceRecord, StoreError};

/// Sealed trait support for implementing artifact types in sibling crates.
#[doc(hidden)]
pub mod __private {
    pub use super::artifact::private::Sealed;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
