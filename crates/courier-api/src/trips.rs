use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use courier_db::Database;
use courier_types::api::{Claims, CreateTripRequest};
use courier_types::models::Trip;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

pub fn create_trip(db: &Database, owner: Uuid, req: CreateTripRequest) -> Result<Trip, ApiError> {
    let origin = req.origin.trim();
    let destination = req.destination.trim();
    if origin.is_empty() || destination.is_empty() {
        return Err(ApiError::bad_request("origin and destination are required"));
    }

    let trip = Trip {
        id: Uuid::new_v4(),
        user_id: owner,
        origin: origin.to_string(),
        destination: destination.to_string(),
        travel_date: req.travel_date,
        created_at: Utc::now(),
    };
    db.insert_trip(&trip)?;

    info!("Trip {} ({} -> {}) posted by {}", trip.id, trip.origin, trip.destination, owner);
    Ok(trip)
}

pub fn list_trips(db: &Database) -> Result<Vec<Trip>, ApiError> {
    Ok(db.list_trips()?)
}

pub fn get_trip(db: &Database, id: Uuid) -> Result<Trip, ApiError> {
    db.get_trip(id)?.ok_or(ApiError::NotFound("trip"))
}

/// POST /trips
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTripRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let trip = run_blocking(&state, move |s| create_trip(&s.db, claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

/// GET /trips
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let trips = run_blocking(&state, |s| list_trips(&s.db)).await?;
    Ok(Json(trips))
}

/// GET /trips/{trip_id}
pub async fn get(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let trip = run_blocking(&state, move |s| get_trip(&s.db, trip_id)).await?;
    Ok(Json(trip))
}
