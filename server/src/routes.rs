//! Router configuration and HTTP handlers.
//!
//! Request/response types are kept separate from the domain types so the
//! wire format can evolve without touching the engine.

use crate::error::ApiError;
use crate::health::health_check;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use trotro_core::{
    Actor, DriverId, GeoPoint, PassengerId, Reservation, ReservationId, SeatNumber, Stop, StopId,
    TransitionRecord, Trip, TripId, VehicleId,
};
use uuid::Uuid;

// ============================================================================
// Request / response types
// ============================================================================

/// One stop of a trip being registered.
#[derive(Debug, Deserialize)]
pub struct StopDefinition {
    /// Stop name
    pub name: String,
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Geofence radius override in meters
    pub fence_radius_m: Option<f64>,
}

/// Body of `POST /api/trips`.
#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    /// Vehicle operating the trip (generated when omitted)
    pub vehicle_id: Option<Uuid>,
    /// Ordered stop list
    pub stops: Vec<StopDefinition>,
    /// Seat inventory
    pub seats: Vec<String>,
}

/// A registered stop echoed back with its generated id.
#[derive(Debug, Serialize)]
pub struct StopCreated {
    /// Stop identifier to use in reservation calls
    pub stop_id: String,
    /// Stop name
    pub name: String,
    /// Route position
    pub index: usize,
}

/// Response of `POST /api/trips`.
#[derive(Debug, Serialize)]
pub struct TripCreatedResponse {
    /// New trip id
    pub trip_id: String,
    /// Registered stops with their ids
    pub stops: Vec<StopCreated>,
}

/// Body of `POST /api/trips/{trip}/reservations`.
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    /// Seat to book
    pub seat: String,
    /// Boarding stop id
    pub boarding_stop: Uuid,
    /// Drop-off stop id
    pub dropoff_stop: Uuid,
    /// Booking passenger (verified upstream)
    pub passenger_id: Uuid,
}

/// Body of `DELETE /api/reservations/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    /// Caller-supplied reason, kept for audit
    pub reason: Option<String>,
}

/// Availability query parameters.
#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    /// Boarding stop id
    pub boarding_stop: Uuid,
    /// Drop-off stop id
    pub dropoff_stop: Uuid,
}

/// Response of the availability query.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// Free seats in seat-number order
    pub seats: Vec<String>,
}

/// A position report from the vehicle feed or a passenger client.
#[derive(Debug, Deserialize)]
pub struct LocationReport {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Fix timestamp
    pub timestamp: DateTime<Utc>,
}

/// Reservation snapshot returned to callers.
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    /// Reservation id
    pub reservation_id: String,
    /// Trip id
    pub trip_id: String,
    /// Seat label
    pub seat: String,
    /// Boarding stop route index
    pub boarding_stop_index: usize,
    /// Drop-off stop route index
    pub dropoff_stop_index: usize,
    /// Owning passenger
    pub passenger_id: String,
    /// Lifecycle status
    pub status: String,
    /// Missed-boarding flag
    pub boarding_missed: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Boarding time, if boarded
    pub boarded_at: Option<DateTime<Utc>>,
    /// Completion time, if completed
    pub completed_at: Option<DateTime<Utc>>,
    /// Cancellation time, if cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Cancellation reason, if cancelled
    pub cancel_reason: Option<String>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            reservation_id: r.id.to_string(),
            trip_id: r.trip_id.to_string(),
            seat: r.seat.to_string(),
            boarding_stop_index: r.segment.boarding(),
            dropoff_stop_index: r.segment.dropoff(),
            passenger_id: r.passenger_id.to_string(),
            status: r.status.to_string(),
            boarding_missed: r.boarding_missed,
            created_at: r.created_at,
            boarded_at: r.boarded_at,
            completed_at: r.completed_at,
            cancelled_at: r.cancelled_at,
            cancel_reason: r.cancel_reason,
        }
    }
}

/// Generic acknowledgement body.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    /// Outcome
    pub status: &'static str,
}

// ============================================================================
// Actor identity
// ============================================================================

/// Reads the verified actor identity forwarded by the auth boundary.
///
/// Missing or malformed headers fall back to `Actor::System`; the engine
/// does not re-verify credentials.
fn actor_from_headers(headers: &HeaderMap) -> Actor {
    let id = headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());
    match headers
        .get("x-actor-role")
        .and_then(|v| v.to_str().ok())
    {
        Some("driver") => id.map_or(Actor::System, |id| Actor::Driver(DriverId::from_uuid(id))),
        Some("passenger") => id.map_or(Actor::System, |id| {
            Actor::Passenger(PassengerId::from_uuid(id))
        }),
        _ => Actor::System,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/trips` - registers a trip and its seat inventory.
pub async fn create_trip(
    State(state): State<AppState>,
    Json(body): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<TripCreatedResponse>), ApiError> {
    let default_radius = state.default_fence_radius_m;
    let stops: Vec<Stop> = body
        .stops
        .iter()
        .map(|s| {
            Stop::new(StopId::new(), s.name.clone(), GeoPoint::new(s.lat, s.lon))
                .with_fence_radius(s.fence_radius_m.unwrap_or(default_radius))
        })
        .collect();
    let created: Vec<StopCreated> = stops
        .iter()
        .enumerate()
        .map(|(index, stop)| StopCreated {
            stop_id: stop.id.to_string(),
            name: stop.name.clone(),
            index,
        })
        .collect();

    let trip = Trip::new(
        TripId::new(),
        body.vehicle_id
            .map_or_else(VehicleId::new, VehicleId::from_uuid),
        stops,
        body.seats.into_iter().map(SeatNumber::new).collect(),
    );
    let trip_id = trip.id;
    state.engine.register_trip(trip).await?;

    Ok((
        StatusCode::CREATED,
        Json(TripCreatedResponse {
            trip_id: trip_id.to_string(),
            stops: created,
        }),
    ))
}

/// `POST /api/trips/{trip}/reservations` - books a seat for a segment.
pub async fn reserve_seat(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(body): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let reservation = state
        .engine
        .reserve(
            TripId::from_uuid(trip_id),
            SeatNumber::new(body.seat),
            StopId::from_uuid(body.boarding_stop),
            StopId::from_uuid(body.dropoff_stop),
            PassengerId::from_uuid(body.passenger_id),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// `DELETE /api/reservations/{id}` - cancels a reservation.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<AckResponse>, ApiError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "cancelled by caller".to_string());
    let actor = actor_from_headers(&headers);
    state
        .engine
        .cancel(ReservationId::from_uuid(id), &reason, actor)
        .await?;
    Ok(Json(AckResponse {
        status: "cancelled",
    }))
}

/// `GET /api/trips/{trip}/availability` - free seats for a segment.
pub async fn availability(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let seats = state
        .engine
        .available_seats(
            TripId::from_uuid(trip_id),
            StopId::from_uuid(params.boarding_stop),
            StopId::from_uuid(params.dropoff_stop),
        )
        .await?;
    Ok(Json(AvailabilityResponse {
        seats: seats.into_iter().map(|s| s.to_string()).collect(),
    }))
}

/// `POST /api/trips/{trip}/location` - one vehicle GPS fix.
pub async fn report_vehicle_location(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(report): Json<LocationReport>,
) -> Result<(StatusCode, Json<AckResponse>), ApiError> {
    state
        .engine
        .report_vehicle_location(
            TripId::from_uuid(trip_id),
            GeoPoint::new(report.lat, report.lon),
            report.timestamp,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(AckResponse { status: "accepted" })))
}

/// `POST /api/reservations/{id}/location` - one passenger position update.
pub async fn report_passenger_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(report): Json<LocationReport>,
) -> Result<(StatusCode, Json<AckResponse>), ApiError> {
    state
        .engine
        .report_passenger_location(
            ReservationId::from_uuid(id),
            GeoPoint::new(report.lat, report.lon),
            report.timestamp,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(AckResponse { status: "accepted" })))
}

/// `POST /api/reservations/{id}/confirm-boarding` - driver override.
pub async fn confirm_boarding(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ReservationResponse>, ApiError> {
    let id = ReservationId::from_uuid(id);
    let actor = actor_from_headers(&headers);
    state.engine.confirm_boarding(id, actor).await?;
    let reservation = state.engine.reservation(id).await?;
    Ok(Json(reservation.into()))
}

/// `POST /api/reservations/{id}/confirm-dropoff` - driver override.
pub async fn confirm_dropoff(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ReservationResponse>, ApiError> {
    let id = ReservationId::from_uuid(id);
    let actor = actor_from_headers(&headers);
    state.engine.confirm_dropoff(id, actor).await?;
    let reservation = state.engine.reservation(id).await?;
    Ok(Json(reservation.into()))
}

/// `GET /api/reservations/{id}` - one reservation snapshot.
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state
        .engine
        .reservation(ReservationId::from_uuid(id))
        .await?;
    Ok(Json(reservation.into()))
}

/// `GET /api/passengers/{id}/reservations` - booking history.
pub async fn passenger_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<Vec<ReservationResponse>> {
    let reservations = state
        .engine
        .reservations_for_passenger(PassengerId::from_uuid(id))
        .await;
    Json(reservations.into_iter().map(Into::into).collect())
}

/// `GET /api/trips/{trip}/audit` - the append-only transition journal.
pub async fn trip_audit(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Vec<TransitionRecord>>, ApiError> {
    let journal = state.engine.audit_log(TripId::from_uuid(trip_id)).await?;
    Ok(Json(journal))
}

/// `GET /events` - server-sent events bridged from the engine publisher.
pub async fn events_stream(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.engine.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                Ok(sse_event) => Some(Ok(sse_event)),
                Err(err) => {
                    tracing::warn!(%err, "failed to encode engine event for SSE");
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!(missed, "SSE subscriber lagged behind the event stream");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ============================================================================
// Router
// ============================================================================

/// Builds the complete axum router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/trips", post(create_trip))
        .route("/trips/:trip_id/reservations", post(reserve_seat))
        .route("/trips/:trip_id/availability", get(availability))
        .route("/trips/:trip_id/location", post(report_vehicle_location))
        .route("/trips/:trip_id/audit", get(trip_audit))
        .route(
            "/reservations/:id",
            get(get_reservation).delete(cancel_reservation),
        )
        .route("/reservations/:id/location", post(report_passenger_location))
        .route("/reservations/:id/confirm-boarding", post(confirm_boarding))
        .route("/reservations/:id/confirm-dropoff", post(confirm_dropoff))
        .route("/passengers/:id/reservations", get(passenger_history));

    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(events_stream))
        .nest("/api", api_routes)
        .with_state(state)
}
