//! Occupancy State Machine: geofence-driven boarding and drop-off.
//!
//! One reducer per trip consumes every occupancy input (vehicle and
//! passenger position updates, driver overrides, grace-window expiries and
//! ledger facts), so the transition rules are defined in exactly one place.
//! The reducer keeps a per-trip view of the reservations it watches and
//! returns effects that apply transitions to the ledger (under the same
//! per-seat mutex the booking path uses) and publish engine events.
//!
//! Auto-boarding requires corroboration: the vehicle must be at the
//! boarding stop *and* the passenger's own position must have matched that
//! stop within the grace window. A vehicle arrival alone is a weaker signal
//! and waits for a driver confirmation. When the window elapses without a
//! match the reservation is flagged `BoardingMissed`, never auto-cancelled.

use crate::effect::Effect;
use crate::environment::Clock;
use crate::events::{EngineEvent, EventPublisher};
use crate::ingest::{StopSignal, VehicleTracker};
use crate::ledger::SeatLedger;
use crate::reducer::Reducer;
use crate::segment::Segment;
use crate::types::{Actor, GeoPoint, PassengerId, ReservationId, SeatNumber, Trip};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Actions (commands + events)
// ============================================================================

/// Inputs to the occupancy machine of one trip.
#[derive(Clone, Debug)]
pub enum OccupancyAction {
    // Commands: location feed
    /// A raw GPS fix from the vehicle telemetry feed
    VehiclePing {
        /// Reported vehicle position
        position: GeoPoint,
        /// Fix timestamp
        at: DateTime<Utc>,
    },

    /// A position update supplied by a passenger's client
    PassengerPing {
        /// The passenger's reservation
        reservation_id: ReservationId,
        /// Reported passenger position
        position: GeoPoint,
        /// Fix timestamp
        at: DateTime<Utc>,
    },

    /// Fed back by a delayed effect when a boarding grace window elapses
    GraceExpired {
        /// Reservation whose window expired
        reservation_id: ReservationId,
        /// Boarding stop the window was opened for
        stop_index: usize,
    },

    // Events: ledger facts mirrored into the machine's view
    /// A reservation was created on this trip
    ReservationBooked {
        /// New reservation
        reservation_id: ReservationId,
        /// Its seat
        seat: SeatNumber,
        /// Its segment
        segment: Segment,
        /// Its owner
        passenger_id: PassengerId,
    },

    /// A reservation was cancelled and no longer needs watching
    ReservationCancelled {
        /// Cancelled reservation
        reservation_id: ReservationId,
    },

    /// A driver override boarded the passenger (already applied to the
    /// ledger)
    BoardingConfirmed {
        /// Boarded reservation
        reservation_id: ReservationId,
    },

    /// A driver override completed the drop-off (already applied to the
    /// ledger)
    DropoffCompleted {
        /// Completed reservation
        reservation_id: ReservationId,
    },
}

// ============================================================================
// State
// ============================================================================

/// What the machine knows about one watched reservation.
#[derive(Clone, Debug)]
struct TrackedReservation {
    segment: Segment,
    on_board: bool,
    missed: bool,
    /// When the passenger's own position last matched the boarding stop
    passenger_seen_at: Option<DateTime<Utc>>,
    /// Monotonicity guard for the passenger feed
    last_passenger_ts: Option<DateTime<Utc>>,
    /// When the vehicle entered the boarding stop's fence
    vehicle_arrived_at: Option<DateTime<Utc>>,
}

/// Per-trip occupancy state: the vehicle fold plus the watched reservations.
#[derive(Debug, Default)]
pub struct OccupancyState {
    tracker: VehicleTracker,
    tracked: HashMap<ReservationId, TrackedReservation>,
}

impl OccupancyState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the machine is currently watching this reservation.
    #[must_use]
    pub fn tracks(&self, id: ReservationId) -> bool {
        self.tracked.contains_key(&id)
    }

    /// Whether the machine's view has this reservation on board.
    #[must_use]
    pub fn is_on_board(&self, id: ReservationId) -> bool {
        self.tracked.get(&id).is_some_and(|t| t.on_board)
    }

    /// Whether the machine's view has this reservation flagged as missed.
    #[must_use]
    pub fn is_missed(&self, id: ReservationId) -> bool {
        self.tracked.get(&id).is_some_and(|t| t.missed)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies injected into one trip's occupancy machine.
#[derive(Clone)]
pub struct OccupancyEnvironment {
    /// The immutable trip this machine watches
    pub trip: Arc<Trip>,
    /// The ledger transitions are applied to
    pub ledger: Arc<SeatLedger>,
    /// Where transition events are published
    pub publisher: EventPublisher,
    /// Clock for grace-expiry stamping
    pub clock: Arc<dyn Clock>,
    grace: chrono::Duration,
    grace_std: std::time::Duration,
}

impl OccupancyEnvironment {
    /// Creates an environment with the given boarding grace window.
    #[must_use]
    pub fn new(
        trip: Arc<Trip>,
        ledger: Arc<SeatLedger>,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
        grace_window: std::time::Duration,
    ) -> Self {
        let grace = chrono::Duration::from_std(grace_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        Self {
            trip,
            ledger,
            publisher,
            clock,
            grace,
            grace_std: grace_window,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// The occupancy state machine for one trip.
#[derive(Clone, Copy, Debug, Default)]
pub struct OccupancyReducer;

impl OccupancyReducer {
    /// Creates a new `OccupancyReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn on_stop_reached(
        state: &mut OccupancyState,
        env: &OccupancyEnvironment,
        stop_index: usize,
        at: DateTime<Utc>,
        effects: &mut SmallVec<[Effect<OccupancyAction>; 4]>,
    ) {
        // Drop-offs first: a freed seat must be visible before any boarding
        // for a back-to-back segment is considered.
        let completions: Vec<ReservationId> = state
            .tracked
            .iter()
            .filter(|(_, t)| t.on_board && t.segment.dropoff() == stop_index)
            .map(|(id, _)| *id)
            .collect();
        for id in completions {
            state.tracked.remove(&id);
            effects.push(complete_effect(env, id, Actor::System, at));
        }

        // Boardings at this stop.
        let boardings: Vec<ReservationId> = state
            .tracked
            .iter()
            .filter(|(_, t)| !t.on_board && t.segment.boarding() == stop_index)
            .map(|(id, _)| *id)
            .collect();
        for id in boardings {
            let Some(tracked) = state.tracked.get_mut(&id) else {
                continue;
            };
            tracked.vehicle_arrived_at = Some(at);
            let corroborated = tracked
                .passenger_seen_at
                .is_some_and(|seen| (at - seen).abs() <= env.grace);
            if corroborated {
                tracked.on_board = true;
                effects.push(board_effect(env, id, Actor::System, at));
            } else {
                // Weaker signal: wait for the passenger (or a driver
                // override) within the grace window before concluding
                // anything.
                effects.push(Effect::Delay {
                    duration: env.grace_std,
                    action: Box::new(OccupancyAction::GraceExpired {
                        reservation_id: id,
                        stop_index,
                    }),
                });
            }
        }

        // The vehicle is past every earlier stop: any reservation still
        // waiting to board there has missed it.
        let missed: Vec<(ReservationId, usize)> = state
            .tracked
            .iter()
            .filter(|(_, t)| !t.on_board && !t.missed && t.segment.boarding() < stop_index)
            .map(|(id, t)| (*id, t.segment.boarding()))
            .collect();
        for (id, boarding) in missed {
            if let Some(tracked) = state.tracked.get_mut(&id) {
                tracked.missed = true;
            }
            effects.push(missed_effect(env, id, boarding, at));
        }
    }

    fn on_passenger_ping(
        state: &mut OccupancyState,
        env: &OccupancyEnvironment,
        reservation_id: ReservationId,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Option<Effect<OccupancyAction>> {
        let Some(tracked) = state.tracked.get_mut(&reservation_id) else {
            tracing::debug!(%reservation_id, "passenger ping for unwatched reservation");
            return None;
        };
        if let Some(last) = tracked.last_passenger_ts {
            if at < last {
                tracing::warn!(%reservation_id, %at, %last, "dropping out-of-order passenger fix");
                metrics::counter!("trotro_stale_location_dropped_total").increment(1);
                return None;
            }
        }
        tracked.last_passenger_ts = Some(at);
        if tracked.on_board {
            return None;
        }

        let boarding_stop = &env.trip.stops[tracked.segment.boarding()];
        if !boarding_stop.contains(position) {
            return None;
        }
        if tracked.passenger_seen_at.is_none() {
            tracing::debug!(
                %reservation_id,
                stop = %boarding_stop.name,
                "passenger matched boarding stop fence"
            );
            tracked.passenger_seen_at = Some(at);
        }

        // If the vehicle is already dwelling at the stop, the sighting
        // completes the corroboration and boards immediately.
        if tracked
            .vehicle_arrived_at
            .is_some_and(|arrived| (at - arrived).abs() <= env.grace)
        {
            tracked.on_board = true;
            tracked.missed = false;
            return Some(board_effect(env, reservation_id, Actor::System, at));
        }
        None
    }

    fn on_grace_expired(
        state: &mut OccupancyState,
        env: &OccupancyEnvironment,
        reservation_id: ReservationId,
        stop_index: usize,
    ) -> Option<Effect<OccupancyAction>> {
        let tracked = state.tracked.get_mut(&reservation_id)?;
        if tracked.on_board || tracked.missed || tracked.segment.boarding() != stop_index {
            return None;
        }
        tracked.missed = true;
        Some(missed_effect(env, reservation_id, stop_index, env.clock.now()))
    }
}

impl Reducer for OccupancyReducer {
    type State = OccupancyState;
    type Action = OccupancyAction;
    type Environment = OccupancyEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut effects = SmallVec::new();
        match action {
            OccupancyAction::VehiclePing { position, at } => {
                let signals = state.tracker.observe(&env.trip, position, at);
                for signal in signals {
                    match signal {
                        StopSignal::Reached { stop_index, at } => {
                            Self::on_stop_reached(state, env, stop_index, at, &mut effects);
                        }
                        StopSignal::Departed { stop_index, at } => {
                            tracing::debug!(
                                trip_id = %env.trip.id,
                                stop_index,
                                %at,
                                "vehicle departed stop"
                            );
                        }
                    }
                }
            }

            OccupancyAction::PassengerPing {
                reservation_id,
                position,
                at,
            } => {
                if let Some(effect) =
                    Self::on_passenger_ping(state, env, reservation_id, position, at)
                {
                    effects.push(effect);
                }
            }

            OccupancyAction::GraceExpired {
                reservation_id,
                stop_index,
            } => {
                if let Some(effect) = Self::on_grace_expired(state, env, reservation_id, stop_index)
                {
                    effects.push(effect);
                }
            }

            OccupancyAction::ReservationBooked {
                reservation_id,
                seat: _,
                segment,
                passenger_id: _,
            } => {
                let vehicle_arrived_at = state
                    .tracker
                    .at_stop()
                    .filter(|(stop_index, _)| *stop_index == segment.boarding())
                    .map(|(_, arrived)| arrived);
                state.tracked.insert(
                    reservation_id,
                    TrackedReservation {
                        segment,
                        on_board: false,
                        missed: false,
                        passenger_seen_at: None,
                        last_passenger_ts: None,
                        vehicle_arrived_at,
                    },
                );
            }

            OccupancyAction::ReservationCancelled { reservation_id } => {
                state.tracked.remove(&reservation_id);
            }

            OccupancyAction::BoardingConfirmed { reservation_id } => {
                if let Some(tracked) = state.tracked.get_mut(&reservation_id) {
                    tracked.on_board = true;
                    tracked.missed = false;
                }
            }

            OccupancyAction::DropoffCompleted { reservation_id } => {
                state.tracked.remove(&reservation_id);
            }
        }
        effects
    }
}

// ============================================================================
// Effects
// ============================================================================

fn board_effect(
    env: &OccupancyEnvironment,
    id: ReservationId,
    actor: Actor,
    at: DateTime<Utc>,
) -> Effect<OccupancyAction> {
    let ledger = Arc::clone(&env.ledger);
    let publisher = env.publisher.clone();
    let trip_id = env.trip.id;
    Effect::Future(Box::pin(async move {
        match ledger.apply_boarding(id, actor, at).await {
            Ok(reservation) => {
                metrics::counter!("trotro_auto_boardings_total").increment(1);
                tracing::info!(reservation_id = %id, %trip_id, "passenger auto-boarded");
                publisher.publish(EngineEvent::BoardingConfirmed {
                    reservation_id: id,
                    trip_id,
                    seat: reservation.seat,
                    segment: reservation.segment,
                    actor,
                    at,
                });
            }
            Err(err) => {
                // The ledger re-validates under the seat mutex; a racing
                // cancel or duplicate delivery lands here as a no-op.
                tracing::debug!(reservation_id = %id, %err, "boarding transition skipped");
            }
        }
        None
    }))
}

fn complete_effect(
    env: &OccupancyEnvironment,
    id: ReservationId,
    actor: Actor,
    at: DateTime<Utc>,
) -> Effect<OccupancyAction> {
    let ledger = Arc::clone(&env.ledger);
    let publisher = env.publisher.clone();
    let trip_id = env.trip.id;
    Effect::Future(Box::pin(async move {
        match ledger.apply_dropoff(id, actor, at).await {
            Ok(reservation) => {
                metrics::counter!("trotro_dropoffs_completed_total").increment(1);
                tracing::info!(reservation_id = %id, %trip_id, "drop-off completed");
                publisher.publish(EngineEvent::DropoffCompleted {
                    reservation_id: id,
                    trip_id,
                    seat: reservation.seat,
                    segment: reservation.segment,
                    actor,
                    at,
                });
            }
            Err(err) => {
                tracing::debug!(reservation_id = %id, %err, "drop-off transition skipped");
            }
        }
        None
    }))
}

fn missed_effect(
    env: &OccupancyEnvironment,
    id: ReservationId,
    stop_index: usize,
    at: DateTime<Utc>,
) -> Effect<OccupancyAction> {
    let ledger = Arc::clone(&env.ledger);
    let publisher = env.publisher.clone();
    let trip_id = env.trip.id;
    Effect::Future(Box::pin(async move {
        match ledger.flag_boarding_missed(id, at).await {
            Ok(Some(reservation)) => {
                metrics::counter!("trotro_boardings_missed_total").increment(1);
                tracing::warn!(
                    reservation_id = %id,
                    %trip_id,
                    stop_index,
                    "boarding missed; flagged for follow-up"
                );
                publisher.publish(EngineEvent::BoardingMissed {
                    reservation_id: id,
                    trip_id,
                    seat: reservation.seat,
                    segment: reservation.segment,
                    stop_index,
                    at,
                });
            }
            Ok(None) => {
                tracing::debug!(reservation_id = %id, "missed flag already handled");
            }
            Err(err) => {
                tracing::debug!(reservation_id = %id, %err, "missed flag skipped");
            }
        }
        None
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::SystemClock;
    use crate::types::{SeatNumber, Stop, StopId, TripId, VehicleId};
    use chrono::TimeZone;
    use trotro_testing::{assertions, ReducerTest};

    fn trip() -> Trip {
        let stops = vec![
            Stop::new(StopId::new(), "Circle", GeoPoint::new(5.57, -0.21)),
            Stop::new(StopId::new(), "Lapaz", GeoPoint::new(5.58, -0.21)),
            Stop::new(StopId::new(), "Madina", GeoPoint::new(5.59, -0.21)),
        ];
        Trip::new(
            TripId::new(),
            VehicleId::new(),
            stops,
            vec![SeatNumber::from("A1")],
        )
    }

    fn env_for(trip: &Trip) -> OccupancyEnvironment {
        OccupancyEnvironment::new(
            Arc::new(trip.clone()),
            Arc::new(SeatLedger::new()),
            EventPublisher::default(),
            Arc::new(SystemClock),
            std::time::Duration::from_secs(120),
        )
    }

    fn ts(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap()
            + chrono::Duration::seconds(i64::from(seconds))
    }

    fn booked_action(id: ReservationId, boarding: usize, dropoff: usize) -> OccupancyAction {
        OccupancyAction::ReservationBooked {
            reservation_id: id,
            seat: SeatNumber::from("A1"),
            segment: Segment::new(boarding, dropoff, 3).unwrap(),
            passenger_id: PassengerId::new(),
        }
    }

    #[test]
    fn corroborated_arrival_boards_automatically() {
        let trip = trip();
        let env = env_for(&trip);
        let reducer = OccupancyReducer::new();
        let mut state = OccupancyState::new();
        let id = ReservationId::new();

        reducer.reduce(&mut state, booked_action(id, 0, 2), &env);
        // Passenger is standing at Circle before the vehicle shows up.
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::PassengerPing {
                reservation_id: id,
                position: GeoPoint::new(5.57, -0.21),
                at: ts(0),
            },
            &env,
        );
        assertions::assert_no_effects(&effects);
        assert!(!state.is_on_board(id));

        // Vehicle reaches Circle: corroboration complete.
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.57, -0.21),
                at: ts(30),
            },
            &env,
        );
        assertions::assert_has_future_effect(&effects);
        assert!(state.is_on_board(id));
    }

    #[test]
    fn passenger_sighting_after_vehicle_arrival_boards() {
        let trip = trip();
        let env = env_for(&trip);
        let reducer = OccupancyReducer::new();
        let mut state = OccupancyState::new();
        let id = ReservationId::new();

        reducer.reduce(&mut state, booked_action(id, 0, 2), &env);

        // Vehicle alone: a weaker signal, so only a grace timer is set.
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.57, -0.21),
                at: ts(0),
            },
            &env,
        );
        assertions::assert_has_delay_effect(&effects);
        assert!(!state.is_on_board(id));

        // Passenger shows up within the window.
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::PassengerPing {
                reservation_id: id,
                position: GeoPoint::new(5.57, -0.21),
                at: ts(60),
            },
            &env,
        );
        assertions::assert_has_future_effect(&effects);
        assert!(state.is_on_board(id));
    }

    #[test]
    fn grace_expiry_flags_missed_boarding() {
        let trip = trip();
        let env = env_for(&trip);
        let reducer = OccupancyReducer::new();
        let mut state = OccupancyState::new();
        let id = ReservationId::new();

        reducer.reduce(&mut state, booked_action(id, 0, 2), &env);
        reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.57, -0.21),
                at: ts(0),
            },
            &env,
        );

        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::GraceExpired {
                reservation_id: id,
                stop_index: 0,
            },
            &env,
        );
        assertions::assert_has_future_effect(&effects);
        assert!(state.is_missed(id));
        assert!(!state.is_on_board(id));

        // Second expiry is a no-op.
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::GraceExpired {
                reservation_id: id,
                stop_index: 0,
            },
            &env,
        );
        assertions::assert_no_effects(&effects);
    }

    #[test]
    fn passing_the_boarding_stop_flags_missed() {
        let trip = trip();
        let env = env_for(&trip);
        let reducer = OccupancyReducer::new();
        let mut state = OccupancyState::new();
        let id = ReservationId::new();

        reducer.reduce(&mut state, booked_action(id, 0, 2), &env);
        reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.57, -0.21),
                at: ts(0),
            },
            &env,
        );
        // Vehicle moves on to Lapaz; the passenger never matched Circle.
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.58, -0.21),
                at: ts(300),
            },
            &env,
        );
        assert!(state.is_missed(id));
        assertions::assert_has_future_effect(&effects);
    }

    #[test]
    fn dropoff_at_segment_end_completes_and_stops_tracking() {
        let trip = trip();
        let env = env_for(&trip);
        let reducer = OccupancyReducer::new();
        let mut state = OccupancyState::new();
        let id = ReservationId::new();

        reducer.reduce(&mut state, booked_action(id, 0, 1), &env);
        reducer.reduce(
            &mut state,
            OccupancyAction::BoardingConfirmed {
                reservation_id: id,
            },
            &env,
        );
        assert!(state.is_on_board(id));

        // Ride from Circle to Lapaz.
        reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.57, -0.21),
                at: ts(0),
            },
            &env,
        );
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.58, -0.21),
                at: ts(600),
            },
            &env,
        );
        assertions::assert_has_future_effect(&effects);
        assert!(!state.tracks(id));
    }

    #[test]
    fn duplicate_stop_arrival_does_not_double_transition() {
        let trip = trip();
        let env = env_for(&trip);
        let reducer = OccupancyReducer::new();
        let mut state = OccupancyState::new();
        let id = ReservationId::new();

        reducer.reduce(&mut state, booked_action(id, 0, 2), &env);
        reducer.reduce(
            &mut state,
            OccupancyAction::PassengerPing {
                reservation_id: id,
                position: GeoPoint::new(5.57, -0.21),
                at: ts(0),
            },
            &env,
        );
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.57, -0.21),
                at: ts(10),
            },
            &env,
        );
        assertions::assert_effects_count(&effects, 1);

        // The vehicle dwells in the fence; nothing re-fires.
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.57, -0.21),
                at: ts(11),
            },
            &env,
        );
        assertions::assert_no_effects(&effects);
    }

    #[test]
    fn cancelled_reservations_are_unwatched() {
        let trip = trip();
        let env = env_for(&trip);
        let reducer = OccupancyReducer::new();
        let mut state = OccupancyState::new();
        let id = ReservationId::new();

        reducer.reduce(&mut state, booked_action(id, 0, 2), &env);
        reducer.reduce(
            &mut state,
            OccupancyAction::ReservationCancelled {
                reservation_id: id,
            },
            &env,
        );
        assert!(!state.tracks(id));

        // Stop arrival after the cancel produces nothing for it.
        let effects = reducer.reduce(
            &mut state,
            OccupancyAction::VehiclePing {
                position: GeoPoint::new(5.57, -0.21),
                at: ts(0),
            },
            &env,
        );
        assertions::assert_no_effects(&effects);
    }

    #[test]
    fn reducer_test_harness_tracks_new_reservations() {
        let trip = trip();
        let id = ReservationId::new();
        ReducerTest::new(OccupancyReducer::new())
            .with_env(env_for(&trip))
            .given_state(OccupancyState::new())
            .when_action(booked_action(id, 1, 2))
            .then_state(move |state| {
                assert!(state.tracks(id));
                assert!(!state.is_on_board(id));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
