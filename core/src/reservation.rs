//! Reservation entity and its status state machine.
//!
//! A reservation books exactly one named seat on one trip for exactly one
//! segment. Status moves `Booked → OnBoard → Completed` on the happy path;
//! cancellation is allowed from `Booked` and `OnBoard`. `Completed` and
//! `Cancelled` are terminal. Reservations are never deleted; cancelled ones
//! stay in the ledger for audit and simply stop blocking their segment.
//!
//! The mutators here are `pub(crate)`: outside the crate, status only moves
//! through the Reservation Coordinator or the Occupancy State Machine.

use crate::error::EngineError;
use crate::segment::Segment;
use crate::types::{Actor, PassengerId, ReservationId, SeatNumber, TripId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Created and holding its segment; passenger not yet on the vehicle
    Booked,
    /// Passenger is on the vehicle
    OnBoard,
    /// Passenger alighted at the drop-off stop; terminal
    Completed,
    /// Cancelled before completion; terminal
    Cancelled,
}

impl ReservationStatus {
    /// Whether a reservation in this status still blocks its segment.
    #[must_use]
    pub const fn blocks(self) -> bool {
        matches!(self, Self::Booked | Self::OnBoard)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Booked => write!(f, "booked"),
            Self::OnBoard => write!(f, "on-board"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A booking of one seat on one trip for one segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier
    pub id: ReservationId,
    /// Trip the seat belongs to
    pub trip_id: TripId,
    /// Reserved seat
    pub seat: SeatNumber,
    /// Half-open stop interval the seat is held for
    pub segment: Segment,
    /// Owning passenger
    pub passenger_id: PassengerId,
    /// Current lifecycle status
    pub status: ReservationStatus,
    /// Set when the vehicle passed the boarding stop without a corroborated
    /// passenger match; the reservation stays `Booked` and waits for
    /// driver/support follow-up
    pub boarding_missed: bool,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
    /// When the passenger boarded, if they did
    pub boarded_at: Option<DateTime<Utc>>,
    /// When the passenger alighted, if they did
    pub completed_at: Option<DateTime<Utc>>,
    /// When the reservation was cancelled, if it was
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Caller-supplied cancellation reason
    pub cancel_reason: Option<String>,
}

impl Reservation {
    /// Creates a new `Booked` reservation.
    #[must_use]
    pub fn new(
        id: ReservationId,
        trip_id: TripId,
        seat: SeatNumber,
        segment: Segment,
        passenger_id: PassengerId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            trip_id,
            seat,
            segment,
            passenger_id,
            status: ReservationStatus::Booked,
            boarding_missed: false,
            created_at,
            boarded_at: None,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
        }
    }

    /// Whether this reservation currently blocks its segment.
    #[must_use]
    pub const fn blocks(&self) -> bool {
        self.status.blocks()
    }

    /// `Booked → OnBoard`. Clears a `boarding_missed` flag, since the
    /// passenger evidently made it after all.
    pub(crate) fn board(&mut self, at: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status != ReservationStatus::Booked {
            return Err(EngineError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: ReservationStatus::OnBoard,
            });
        }
        self.status = ReservationStatus::OnBoard;
        self.boarded_at = Some(at);
        self.boarding_missed = false;
        Ok(())
    }

    /// `OnBoard → Completed`.
    pub(crate) fn complete(&mut self, at: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status != ReservationStatus::OnBoard {
            return Err(EngineError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: ReservationStatus::Completed,
            });
        }
        self.status = ReservationStatus::Completed;
        self.completed_at = Some(at);
        Ok(())
    }

    /// `Booked | OnBoard → Cancelled`.
    pub(crate) fn cancel(
        &mut self,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !self.status.blocks() {
            return Err(EngineError::NotCancellable {
                id: self.id,
                status: self.status,
            });
        }
        self.status = ReservationStatus::Cancelled;
        self.cancelled_at = Some(at);
        self.cancel_reason = Some(reason.into());
        Ok(())
    }

    /// Flags a still-`Booked` reservation as missed at boarding. Returns
    /// `true` only when the flag was newly set, so callers can publish the
    /// `BoardingMissed` event exactly once.
    pub(crate) fn flag_missed(&mut self) -> bool {
        if self.status == ReservationStatus::Booked && !self.boarding_missed {
            self.boarding_missed = true;
            return true;
        }
        false
    }
}

// ============================================================================
// Audit journal
// ============================================================================

/// What happened in a journaled transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Reservation inserted as `Booked`
    Created,
    /// `Booked → OnBoard`
    Boarded,
    /// `OnBoard → Completed`
    Completed,
    /// `Booked | OnBoard → Cancelled`
    Cancelled,
    /// `boarding_missed` flag raised
    BoardingMissed,
}

/// One immutable entry of the per-trip audit journal.
///
/// Transitions are appended, never rewritten, so investigations into
/// disputed boarding/drop-off events can replay the full history including
/// which actor (system vs. driver override) drove each step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Reservation the transition applies to
    pub reservation_id: ReservationId,
    /// Trip the reservation belongs to
    pub trip_id: TripId,
    /// Seat involved
    pub seat: SeatNumber,
    /// What happened
    pub kind: TransitionKind,
    /// Who drove the transition
    pub actor: Actor,
    /// When it happened
    pub at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn booked() -> Reservation {
        Reservation::new(
            ReservationId::new(),
            TripId::new(),
            SeatNumber::from("A1"),
            Segment::new(0, 2, 3).unwrap(),
            PassengerId::new(),
            Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 6, 30, 0).unwrap()
    }

    #[test]
    fn happy_path_booked_onboard_completed() {
        let mut r = booked();
        r.board(now()).unwrap();
        assert_eq!(r.status, ReservationStatus::OnBoard);
        assert_eq!(r.boarded_at, Some(now()));

        r.complete(now()).unwrap();
        assert_eq!(r.status, ReservationStatus::Completed);
        assert_eq!(r.completed_at, Some(now()));
        assert!(!r.blocks());
    }

    #[test]
    fn cancel_allowed_from_booked_and_onboard_only() {
        let mut r = booked();
        r.cancel("changed plans", now()).unwrap();
        assert_eq!(r.status, ReservationStatus::Cancelled);
        assert_eq!(r.cancel_reason.as_deref(), Some("changed plans"));

        let mut r = booked();
        r.board(now()).unwrap();
        r.cancel("no-show at drop-off", now()).unwrap();
        assert_eq!(r.status, ReservationStatus::Cancelled);

        let mut r = booked();
        r.board(now()).unwrap();
        r.complete(now()).unwrap();
        assert!(matches!(
            r.cancel("too late", now()),
            Err(EngineError::NotCancellable { .. })
        ));
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut r = booked();
        r.board(now()).unwrap();
        r.complete(now()).unwrap();
        assert!(matches!(
            r.board(now()),
            Err(EngineError::InvalidTransition { .. })
        ));

        let mut r = booked();
        r.cancel("gone", now()).unwrap();
        assert!(matches!(
            r.board(now()),
            Err(EngineError::InvalidTransition { .. })
        ));
        assert!(matches!(
            r.complete(now()),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancelled_after_boarding_cannot_complete() {
        let mut r = booked();
        r.board(now()).unwrap();
        r.cancel("driver reported no-show at drop-off", now()).unwrap();
        assert!(matches!(
            r.complete(now()),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn missed_flag_sets_once_and_clears_on_boarding() {
        let mut r = booked();
        assert!(r.flag_missed());
        assert!(!r.flag_missed());
        assert!(r.boarding_missed);
        assert_eq!(r.status, ReservationStatus::Booked);

        // A late driver override still boards the passenger.
        r.board(now()).unwrap();
        assert!(!r.boarding_missed);
    }
}
