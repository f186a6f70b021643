//! Maps engine errors onto HTTP responses.
//!
//! Every [`EngineError`] variant gets a distinct machine-readable code so
//! clients can tell "seat unavailable for this segment" from "seat does not
//! exist" from "trip not found" instead of seeing a generic failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use trotro_core::EngineError;

/// Error payload returned to HTTP callers.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable error code
    pub code: &'static str,
    /// Human-readable description
    pub message: String,
}

/// Wrapper that turns an [`EngineError`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// The HTTP status and stable code for this error.
    #[must_use]
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self.0 {
            EngineError::TripNotFound(_) => (StatusCode::NOT_FOUND, "trip-not-found"),
            EngineError::ReservationNotFound(_) => {
                (StatusCode::NOT_FOUND, "reservation-not-found")
            }
            EngineError::UnknownSeat { .. } => (StatusCode::NOT_FOUND, "unknown-seat"),
            EngineError::UnknownStop(_) => (StatusCode::NOT_FOUND, "unknown-stop"),
            EngineError::TripExists(_) => (StatusCode::CONFLICT, "trip-exists"),
            EngineError::SeatSegmentConflict { .. } => {
                (StatusCode::CONFLICT, "seat-segment-conflict")
            }
            EngineError::NotCancellable { .. } => (StatusCode::CONFLICT, "not-cancellable"),
            EngineError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "invalid-transition")
            }
            EngineError::InvalidTrip(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid-trip"),
            EngineError::InvalidSegment { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid-segment")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorBody {
            code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trotro_core::{ReservationId, TripId};

    #[test]
    fn conflict_and_not_found_map_to_distinct_codes() {
        let (status, code) = ApiError(EngineError::TripNotFound(TripId::new())).status_and_code();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "trip-not-found");

        let (status, code) =
            ApiError(EngineError::ReservationNotFound(ReservationId::new())).status_and_code();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "reservation-not-found");

        let (status, code) = ApiError(EngineError::InvalidSegment {
            reason: "backwards".to_string(),
        })
        .status_and_code();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "invalid-segment");
    }
}
