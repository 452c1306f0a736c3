//! K-point sets as auxiliary artifacts

use fleurinp_artifact::{ArtifactError, ArtifactType, ContentHash, __private::Sealed};
use serde::{Deserialize, Serialize};

/// An explicit list of k-points with weights, in internal coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpointsData {
    points: Vec<[f64; 3]>,
    weights: Vec<f64>,
}

impl KpointsData {
    /// Pair points with weights
    ///
    /// # Errors
    /// [`ArtifactError::InvariantViolation`] if the lengths differ, the list is
    /// empty or a value is not finite
    pub fn new(points: Vec<[f64; 3]>, weights: Vec<f64>) -> Result<Self, ArtifactError> {
        let data = Self { points, weights };
        KpointsArtifact::validate_content(&data)?;
        Ok(data)
    }

    /// Points with equal weights summing to one
    ///
    /// # Errors
    /// As [`KpointsData::new`]
    pub fn uniform(points: Vec<[f64; 3]>) -> Result<Self, ArtifactError> {
        let weight = 1.0 / points.len().max(1) as f64;
        let weights = vec![weight; points.len()];
        Self::new(points, weights)
    }

    /// The k-points
    #[inline]
    #[must_use]
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Their weights
    #[inline]
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Number of k-points
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the list is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Artifact type of stored k-point sets
#[derive(Debug, Clone)]
pub struct KpointsArtifact;

impl Sealed for KpointsArtifact {}

impl ArtifactType for KpointsArtifact {
    type Content = KpointsData;

    fn hash(content: &Self::Content) -> ContentHash {
        let mut bytes = Vec::with_capacity(content.len() * 32);
        for (point, weight) in content.points.iter().zip(&content.weights) {
            for value in point.iter().chain(std::iter::once(weight)) {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        ContentHash::compute(&bytes)
    }

    const TYPE_ID: &'static str = "fleur.kpoints";

    fn validate_content(content: &Self::Content) -> Result<(), ArtifactError> {
        if content.points.is_empty() {
            return Err(ArtifactError::InvariantViolation("empty k-point list".to_string()));
        }
        if content.points.len() != content.weights.len() {
            return Err(ArtifactError::InvariantViolation(format!(
                "{} k-points but {} weights",
                content.points.len(),
                content.weights.len()
            )));
        }
        let finite = content
            .points
            .iter()
            .flatten()
            .chain(&content.weights)
            .all(|v| v.is_finite());
        if !finite {
            return Err(ArtifactError::InvariantViolation("non-finite k-point value".to_string()));
        }
        Ok(())
    }
}
