//! End-to-end scenarios against the full engine.
//!
//! The main flow mirrors a one-seat trotro running Circle → Lapaz → Madina:
//! the same physical seat is sold twice for back-to-back segments, boarding
//! and drop-off are driven by the location feed, and the freed seat is
//! immediately bookable again.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::{DateTime, Duration, TimeZone, Utc};
use trotro_core::{
    Actor, DriverId, Engine, EngineConfig, EngineError, GeoPoint, PassengerId, ReservationId,
    ReservationStatus, SeatNumber, Stop, StopId, TransitionKind, Trip, TripId, VehicleId,
};
use trotro_testing::EventCapture;

const CIRCLE: GeoPoint = GeoPoint::new(5.57, -0.21);
const LAPAZ: GeoPoint = GeoPoint::new(5.58, -0.21);
const MADINA: GeoPoint = GeoPoint::new(5.59, -0.21);

fn trip_with_seats(seats: &[&str]) -> Trip {
    let stops = vec![
        Stop::new(StopId::new(), "Circle", CIRCLE),
        Stop::new(StopId::new(), "Lapaz", LAPAZ),
        Stop::new(StopId::new(), "Madina", MADINA),
    ];
    Trip::new(
        TripId::new(),
        VehicleId::new(),
        stops,
        seats.iter().map(|s| SeatNumber::from(*s)).collect(),
    )
}

fn ts(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap() + Duration::seconds(seconds)
}

#[tokio::test]
async fn one_seat_two_passengers_full_trip() {
    let engine = Engine::new(EngineConfig::default());
    let trip = trip_with_seats(&["A1"]);
    let trip_id = trip.id;
    let circle = trip.stops[0].id;
    let lapaz = trip.stops[1].id;
    let madina = trip.stops[2].id;
    engine.register_trip(trip).await.unwrap();

    let mut capture = EventCapture::new(engine.subscribe());
    let seat = SeatNumber::from("A1");
    let p1 = PassengerId::new();
    let p2 = PassengerId::new();
    let p3 = PassengerId::new();

    // P1 books Circle → Lapaz.
    let r1 = engine
        .reserve(trip_id, seat.clone(), circle, lapaz, p1)
        .await
        .unwrap();
    assert_eq!(r1.status, ReservationStatus::Booked);

    // P2 books the disjoint Lapaz → Madina on the same seat.
    let r2 = engine
        .reserve(trip_id, seat.clone(), lapaz, madina, p2)
        .await
        .unwrap();
    assert_eq!(r2.status, ReservationStatus::Booked);

    // P3 wants the whole route: conflicts with both.
    let err = engine
        .reserve(trip_id, seat.clone(), circle, madina, p3)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SeatSegmentConflict { .. }));

    // Both passengers report themselves at their boarding stops.
    engine
        .report_passenger_location(r1.id, CIRCLE, ts(0))
        .await
        .unwrap();
    engine
        .report_passenger_location(r2.id, LAPAZ, ts(10))
        .await
        .unwrap();

    // Vehicle reaches Circle: P1's boarding is corroborated.
    engine
        .report_vehicle_location(trip_id, CIRCLE, ts(30))
        .await
        .unwrap();
    assert_eq!(
        engine.reservation(r1.id).await.unwrap().status,
        ReservationStatus::OnBoard
    );

    // Vehicle rolls on and reaches Lapaz: P1 completes, P2 boards.
    engine
        .report_vehicle_location(trip_id, GeoPoint::new(5.575, -0.21), ts(60))
        .await
        .unwrap();
    engine
        .report_vehicle_location(trip_id, LAPAZ, ts(120))
        .await
        .unwrap();

    let r1_after = engine.reservation(r1.id).await.unwrap();
    assert_eq!(r1_after.status, ReservationStatus::Completed);
    assert!(r1_after.completed_at.is_some());
    assert_eq!(
        engine.reservation(r2.id).await.unwrap().status,
        ReservationStatus::OnBoard
    );

    // Substitution: the Circle → Lapaz segment is free again right away.
    let free = engine
        .available_seats(trip_id, circle, lapaz)
        .await
        .unwrap();
    assert_eq!(free, vec![seat.clone()]);

    // The audit journal saw every transition.
    let journal = engine.audit_log(trip_id).await.unwrap();
    let kinds: Vec<TransitionKind> = journal.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == TransitionKind::Created)
            .count(),
        2
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == TransitionKind::Boarded)
            .count(),
        2
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == TransitionKind::Completed)
            .count(),
        1
    );

    let names = capture.drain_names();
    assert_eq!(
        names,
        vec![
            "reservation-created",
            "reservation-created",
            "boarding-confirmed",
            "dropoff-completed",
            "boarding-confirmed",
        ]
    );
}

#[tokio::test]
async fn manual_override_always_wins() {
    let engine = Engine::new(EngineConfig::default());
    let trip = trip_with_seats(&["A1"]);
    let trip_id = trip.id;
    let circle = trip.stops[0].id;
    let lapaz = trip.stops[1].id;
    engine.register_trip(trip).await.unwrap();

    let r = engine
        .reserve(
            trip_id,
            SeatNumber::from("A1"),
            circle,
            lapaz,
            PassengerId::new(),
        )
        .await
        .unwrap();

    // No geofence event has ever been received for this trip.
    let driver = Actor::Driver(DriverId::new());
    engine.confirm_boarding(r.id, driver).await.unwrap();
    assert_eq!(
        engine.reservation(r.id).await.unwrap().status,
        ReservationStatus::OnBoard
    );

    engine.confirm_dropoff(r.id, driver).await.unwrap();
    assert_eq!(
        engine.reservation(r.id).await.unwrap().status,
        ReservationStatus::Completed
    );

    // Overrides are journaled with the driver's identity.
    let journal = engine.audit_log(trip_id).await.unwrap();
    assert!(journal
        .iter()
        .any(|t| t.kind == TransitionKind::Boarded && t.actor == driver));

    // A second confirmation is out of sync with the state machine.
    let err = engine.confirm_boarding(r.id, driver).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn missed_boarding_is_flagged_not_cancelled() {
    let engine = Engine::new(EngineConfig::default());
    let trip = trip_with_seats(&["A1"]);
    let trip_id = trip.id;
    let circle = trip.stops[0].id;
    let lapaz = trip.stops[1].id;
    engine.register_trip(trip).await.unwrap();

    let mut capture = EventCapture::new(engine.subscribe());
    let r = engine
        .reserve(
            trip_id,
            SeatNumber::from("A1"),
            circle,
            lapaz,
            PassengerId::new(),
        )
        .await
        .unwrap();
    capture.drain();

    // The vehicle serves Circle and moves on; the passenger never showed.
    engine
        .report_vehicle_location(trip_id, CIRCLE, ts(0))
        .await
        .unwrap();
    engine
        .report_vehicle_location(trip_id, LAPAZ, ts(300))
        .await
        .unwrap();

    let flagged = engine.reservation(r.id).await.unwrap();
    assert_eq!(flagged.status, ReservationStatus::Booked);
    assert!(flagged.boarding_missed);
    assert!(capture.drain_names().contains(&"boarding-missed"));

    // Follow-up is a human decision: the driver can still board them...
    let driver = Actor::Driver(DriverId::new());
    engine.confirm_boarding(r.id, driver).await.unwrap();
    let boarded = engine.reservation(r.id).await.unwrap();
    assert_eq!(boarded.status, ReservationStatus::OnBoard);
    assert!(!boarded.boarding_missed);
}

#[tokio::test]
async fn cancellation_frees_the_segment_immediately() {
    let engine = Engine::new(EngineConfig::default());
    let trip = trip_with_seats(&["A1"]);
    let trip_id = trip.id;
    let circle = trip.stops[0].id;
    let lapaz = trip.stops[1].id;
    engine.register_trip(trip).await.unwrap();

    let seat = SeatNumber::from("A1");
    let p1 = PassengerId::new();
    let r = engine
        .reserve(trip_id, seat.clone(), circle, lapaz, p1)
        .await
        .unwrap();

    assert!(engine
        .available_seats(trip_id, circle, lapaz)
        .await
        .unwrap()
        .is_empty());

    engine
        .cancel(r.id, "plans changed", Actor::Passenger(p1))
        .await
        .unwrap();
    assert_eq!(
        engine
            .available_seats(trip_id, circle, lapaz)
            .await
            .unwrap(),
        vec![seat.clone()]
    );

    // Cancelled is terminal.
    let err = engine
        .cancel(r.id, "again", Actor::Passenger(p1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotCancellable { .. }));

    // The record survives for audit and for the passenger's history.
    let history = engine.reservations_for_passenger(p1).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn stale_location_updates_are_ignored() {
    let engine = Engine::new(EngineConfig::default());
    let trip = trip_with_seats(&["A1"]);
    let trip_id = trip.id;
    let circle = trip.stops[0].id;
    let lapaz = trip.stops[1].id;
    engine.register_trip(trip).await.unwrap();

    let r = engine
        .reserve(
            trip_id,
            SeatNumber::from("A1"),
            circle,
            lapaz,
            PassengerId::new(),
        )
        .await
        .unwrap();
    engine
        .report_passenger_location(r.id, CIRCLE, ts(60))
        .await
        .unwrap();

    // A fix at t=100 between stops, then a stale fix at t=50 placing the
    // vehicle inside the Circle fence. The stale one must not board anyone.
    engine
        .report_vehicle_location(trip_id, GeoPoint::new(5.575, -0.21), ts(100))
        .await
        .unwrap();
    engine
        .report_vehicle_location(trip_id, CIRCLE, ts(50))
        .await
        .unwrap();
    assert_eq!(
        engine.reservation(r.id).await.unwrap().status,
        ReservationStatus::Booked
    );

    // A fresh fix at t=150 works normally.
    engine
        .report_vehicle_location(trip_id, CIRCLE, ts(150))
        .await
        .unwrap();
    assert_eq!(
        engine.reservation(r.id).await.unwrap().status,
        ReservationStatus::OnBoard
    );
}

#[tokio::test]
async fn error_taxonomy_distinguishes_callers_mistakes() {
    let engine = Engine::new(EngineConfig::default());
    let trip = trip_with_seats(&["A1"]);
    let trip_id = trip.id;
    let circle = trip.stops[0].id;
    let lapaz = trip.stops[1].id;
    engine.register_trip(trip).await.unwrap();

    // Trip not found.
    let ghost = TripId::new();
    assert!(matches!(
        engine
            .reserve(ghost, SeatNumber::from("A1"), circle, lapaz, PassengerId::new())
            .await,
        Err(EngineError::TripNotFound(id)) if id == ghost
    ));

    // Seat does not exist.
    assert!(matches!(
        engine
            .reserve(trip_id, SeatNumber::from("Z9"), circle, lapaz, PassengerId::new())
            .await,
        Err(EngineError::UnknownSeat { .. })
    ));

    // Stop not on the trip.
    assert!(matches!(
        engine
            .reserve(trip_id, SeatNumber::from("A1"), StopId::new(), lapaz, PassengerId::new())
            .await,
        Err(EngineError::UnknownStop(_))
    ));

    // Backwards segment.
    assert!(matches!(
        engine
            .reserve(trip_id, SeatNumber::from("A1"), lapaz, circle, PassengerId::new())
            .await,
        Err(EngineError::InvalidSegment { .. })
    ));

    // Unknown reservation.
    assert!(matches!(
        engine.confirm_boarding(ReservationId::new(), Actor::System).await,
        Err(EngineError::ReservationNotFound(_))
    ));
}
