//! Stop/Segment index: half-open stop-index intervals over a trip's route.
//!
//! A segment `[boarding, dropoff)` is the portion of a trip a passenger
//! occupies a seat for. Two reservations can share a physical seat exactly
//! when their segments do not intersect, so the overlap test here is the
//! primitive the whole ledger invariant rests on.

use crate::error::EngineError;
use crate::types::{Stop, StopId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A half-open interval `[boarding, dropoff)` over a trip's stop indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    boarding: usize,
    dropoff: usize,
}

impl Segment {
    /// Creates a segment, enforcing `boarding < dropoff < stop_count`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSegment`] when the interval is empty,
    /// reversed, or runs past the end of the route.
    pub fn new(boarding: usize, dropoff: usize, stop_count: usize) -> Result<Self, EngineError> {
        if boarding >= dropoff {
            return Err(EngineError::InvalidSegment {
                reason: format!("drop-off index {dropoff} must follow boarding index {boarding}"),
            });
        }
        if dropoff >= stop_count {
            return Err(EngineError::InvalidSegment {
                reason: format!(
                    "drop-off index {dropoff} is outside the route of {stop_count} stops"
                ),
            });
        }
        Ok(Self { boarding, dropoff })
    }

    /// Index of the boarding stop (inclusive bound).
    #[must_use]
    pub const fn boarding(&self) -> usize {
        self.boarding
    }

    /// Index of the drop-off stop (exclusive bound).
    #[must_use]
    pub const fn dropoff(&self) -> usize {
        self.dropoff
    }

    /// Interval-intersection test.
    ///
    /// Half-open semantics make back-to-back segments (`[0, 2)` and
    /// `[2, 4)`) disjoint: the drop-off stop of one is the boarding stop of
    /// the next, which is precisely the seat-substitution case.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.boarding < other.dropoff && other.boarding < self.dropoff
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.boarding, self.dropoff)
    }
}

/// Immutable per-trip mapping from stop ids to route positions.
///
/// Built once when a trip is registered and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct StopIndex {
    positions: HashMap<StopId, usize>,
    stop_count: usize,
}

impl StopIndex {
    /// Builds the index from a trip's ordered stop list.
    #[must_use]
    pub fn new(stops: &[Stop]) -> Self {
        let positions = stops
            .iter()
            .enumerate()
            .map(|(index, stop)| (stop.id, index))
            .collect();
        Self {
            positions,
            stop_count: stops.len(),
        }
    }

    /// Route position of a stop, if it belongs to the trip.
    #[must_use]
    pub fn position_of(&self, stop: StopId) -> Option<usize> {
        self.positions.get(&stop).copied()
    }

    /// Number of stops on the route.
    #[must_use]
    pub const fn stop_count(&self) -> usize {
        self.stop_count
    }

    /// Converts a (boarding stop, drop-off stop) pair into a segment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownStop`] when either stop is not part of
    /// the trip, and [`EngineError::InvalidSegment`] when the drop-off does
    /// not strictly follow the boarding stop in route order.
    pub fn segment_of(&self, boarding: StopId, dropoff: StopId) -> Result<Segment, EngineError> {
        let from = self
            .position_of(boarding)
            .ok_or(EngineError::UnknownStop(boarding))?;
        let to = self
            .position_of(dropoff)
            .ok_or(EngineError::UnknownStop(dropoff))?;
        Segment::new(from, to, self.stop_count)
    }
}
