//! Location ingest: folds raw vehicle GPS fixes into stop arrival signals.
//!
//! Each trip owns one [`VehicleTracker`], an explicit fold over the position
//! feed. Every update is evaluated against the geofence of the next
//! unvisited stop; entering it yields one `Reached` signal, leaving it one
//! `Departed` signal. Staying inside the fence yields nothing, which is the
//! idempotency guarantee: repeated fence membership never re-emits.
//!
//! Updates older than the last applied one are dropped with a warning and
//! never applied backwards, so a stale ping can never re-board a
//! completed reservation.

use crate::types::{GeoPoint, Trip};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;

/// A stop-fence transition derived from the vehicle feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StopSignal {
    /// The vehicle entered the fence of the stop at `stop_index`.
    Reached {
        /// Route position of the stop
        stop_index: usize,
        /// Timestamp of the triggering fix
        at: DateTime<Utc>,
    },
    /// The vehicle left the fence of the stop at `stop_index`.
    Departed {
        /// Route position of the stop
        stop_index: usize,
        /// Timestamp of the triggering fix
        at: DateTime<Utc>,
    },
}

/// Per-trip fold state over the vehicle position feed.
#[derive(Debug, Default)]
pub(crate) struct VehicleTracker {
    /// Route position of the next stop the vehicle has not reached yet
    next_stop: usize,
    /// Whether the vehicle is currently inside the fence of the stop it
    /// most recently reached
    inside_fence: bool,
    /// Timestamp of the last applied fix (monotonicity guard)
    last_ts: Option<DateTime<Utc>>,
    /// Most recently reached stop and when the fence was entered
    last_reached: Option<(usize, DateTime<Utc>)>,
}

impl VehicleTracker {
    /// Folds one position fix, returning any fence transitions it caused.
    ///
    /// A single fix can produce both a departure from the previous stop and
    /// an arrival at the next when consecutive fences are far apart.
    pub(crate) fn observe(
        &mut self,
        trip: &Trip,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> SmallVec<[StopSignal; 2]> {
        let mut signals = SmallVec::new();

        if let Some(last) = self.last_ts {
            if at < last {
                tracing::warn!(
                    trip_id = %trip.id,
                    %at,
                    %last,
                    "dropping out-of-order vehicle fix"
                );
                metrics::counter!("trotro_stale_location_dropped_total").increment(1);
                return signals;
            }
        }
        self.last_ts = Some(at);

        if self.inside_fence {
            // next_stop was advanced when the fence was entered.
            let current = self.next_stop - 1;
            if !trip.stops[current].contains(position) {
                self.inside_fence = false;
                tracing::debug!(trip_id = %trip.id, stop_index = current, "vehicle left stop fence");
                signals.push(StopSignal::Departed {
                    stop_index: current,
                    at,
                });
            }
        }

        if !self.inside_fence && self.next_stop < trip.stops.len() {
            let next = &trip.stops[self.next_stop];
            if next.contains(position) {
                tracing::info!(
                    trip_id = %trip.id,
                    stop_index = self.next_stop,
                    stop = %next.name,
                    "vehicle reached stop"
                );
                signals.push(StopSignal::Reached {
                    stop_index: self.next_stop,
                    at,
                });
                self.last_reached = Some((self.next_stop, at));
                self.inside_fence = true;
                self.next_stop += 1;
            }
        }

        signals
    }

    /// The stop the vehicle is currently dwelling at, if any.
    pub(crate) fn at_stop(&self) -> Option<(usize, DateTime<Utc>)> {
        if self.inside_fence {
            self.last_reached
        } else {
            None
        }
    }
}
