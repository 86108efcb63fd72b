use std::collections::HashSet;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Stroke;

/// The full set of committed strokes in a room, in creation order.
///
/// This is what a joining participant receives instead of a replay of the
/// room's history.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct Snapshot {
    pub strokes: Vec<Stroke>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("stroke has an empty id")]
    EmptyId,
    #[error("stroke {0} has fewer than two points")]
    TooFewPoints(String),
    #[error("stroke {0} has a non-finite point")]
    NonFinitePoint(String),
    #[error("stroke {0} appears more than once")]
    DuplicateId(String),
    #[error("stroke {0} is out of creation order")]
    OutOfOrder(String),
}

impl Snapshot {
    /// Builds a snapshot from strokes in any order.
    pub fn new(mut strokes: Vec<Stroke>) -> Self {
        sort_by_creation(&mut strokes);
        Self { strokes }
    }

    /// Checks a received snapshot: committed strokes only, unique ids,
    /// finite coordinates, ordered by `created_at`.
    pub fn validate(strokes: Vec<Stroke>) -> Result<Self, SnapshotError> {
        let mut seen = HashSet::new();
        let mut last_created = i64::MIN;
        for stroke in &strokes {
            if stroke.id.is_empty() {
                return Err(SnapshotError::EmptyId);
            }
            if !stroke.is_committable() {
                return Err(SnapshotError::TooFewPoints(stroke.id.clone()));
            }
            if !stroke.points.iter().all(|point| point.is_finite()) {
                return Err(SnapshotError::NonFinitePoint(stroke.id.clone()));
            }
            if !seen.insert(stroke.id.as_str()) {
                return Err(SnapshotError::DuplicateId(stroke.id.clone()));
            }
            if stroke.created_at < last_created {
                return Err(SnapshotError::OutOfOrder(stroke.id.clone()));
            }
            last_created = stroke.created_at;
        }
        Ok(Self { strokes })
    }
}

/// Orders strokes by creation time, breaking ties by id so every replica
/// paints them in the same order.
pub fn sort_by_creation(strokes: &mut [Stroke]) {
    strokes.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
