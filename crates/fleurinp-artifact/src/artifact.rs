//! Artifact type trait and the immutable artifact container
//!
//! Defines the [`ArtifactType`] trait for content-addressed typed artifacts.
//! This is a sealed trait; downstream crates opt in through
//! [`crate::__private::Sealed`].

use crate::hash::ContentHash;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Trait for artifact types
///
/// Implemented once per kind of stored data (input decks, k-point sets,
/// serialized task lists).
///
/// # Contract
/// - `hash` must be deterministic: equal content gives an equal hash
/// - `TYPE_ID` must be unique across all artifact types and never change
pub trait ArtifactType: Send + Sync + 'static + Debug + private::Sealed {
    /// The content type for this artifact
    type Content: Send + Sync + 'static + Debug + Clone + PartialEq;

    /// Compute content hash
    fn hash(content: &Self::Content) -> ContentHash;

    /// Artifact type identifier
    const TYPE_ID: &'static str;

    /// Validate content invariants
    ///
    /// Default implementation always succeeds.
    ///
    /// # Errors
    /// Returns error if content violates invariants
    fn validate_content(_content: &Self::Content) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// Sealed trait - prevents accidental external implementations
#[doc(hidden)]
pub mod private {
    /// Sealed trait marker
    pub trait Sealed {}
}

/// Errors related to artifact operations
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Content invariant violation
    #[error("content invariant violated: {0}")]
    InvariantViolation(String),

    /// Hash mismatch (integrity check failed)
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },
}

/// Content-addressed typed artifact
///
/// # Invariants
/// - `hash` is always `T::hash(&content)`
/// - Immutable after construction: there is no `&mut` access to the content
#[derive(Debug, PartialEq)]
pub struct Artifact<T: ArtifactType> {
    hash: ContentHash,
    content: T::Content,
    _phantom: PhantomData<T>,
}

impl<T: ArtifactType> Clone for Artifact<T> {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash,
            content: self.content.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: ArtifactType> Artifact<T> {
    /// Create new artifact (validates, then computes the hash)
    ///
    /// # Errors
    /// Returns error if content validation fails
    pub fn new(content: T::Content) -> Result<Self, ArtifactError> {
        T::validate_content(&content)?;
        let hash = T::hash(&content);
        Ok(Self {
            hash,
            content,
            _phantom: PhantomData,
        })
    }

    /// Content hash (identity)
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Reference to content
    #[inline]
    #[must_use]
    pub fn content(&self) -> &T::Content {
        &self.content
    }

    /// Move content out of the artifact
    #[inline]
    #[must_use]
    pub fn into_content(self) -> T::Content {
        self.content
    }

    /// Verify integrity
    ///
    /// # Errors
    /// Returns [`ArtifactError::HashMismatch`] if the content no longer hashes
    /// to the recorded identity.
    pub fn verify(&self) -> Result<(), ArtifactError> {
        let actual = T::hash(&self.content);
        if actual == self.hash {
            Ok(())
        } else {
            Err(ArtifactError::HashMismatch {
                expected: self.hash,
                actual,
            })
        }
    }

    /// Get type identifier
    #[inline]
    #[must_use]
    pub fn type_id() -> &'static str {
        T::TYPE_ID
    }
}

/// Type-erased reference to a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub hash: ContentHash,
    pub type_id: &'static str,
}

impl NodeRef {
    /// Create from typed artifact
    #[inline]
    #[must_use]
    pub fn from_typed<T: ArtifactType>(artifact: &Artifact<T>) -> Self {
        Self {
            hash: *artifact.hash(),
            type_id: T::TYPE_ID,
        }
    }
}
