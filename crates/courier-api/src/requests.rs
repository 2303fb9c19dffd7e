use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use courier_db::Database;
use courier_types::api::{Claims, CreatePurchaseRequest};
use courier_types::models::{PurchaseRequest, RequestStatus};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// File a new request against a trip. It always starts out pending.
pub fn create_request(
    db: &Database,
    requester: Uuid,
    req: CreatePurchaseRequest,
) -> Result<PurchaseRequest, ApiError> {
    let product_name = req.product_name.trim();
    if product_name.is_empty() {
        return Err(ApiError::bad_request("product_name is required"));
    }

    let trip = db.get_trip(req.trip_id)?.ok_or(ApiError::NotFound("trip"))?;
    if trip.user_id == requester {
        return Err(ApiError::Forbidden("travelers cannot request products on their own trip"));
    }

    let request = PurchaseRequest {
        id: Uuid::new_v4(),
        trip_id: trip.id,
        requester_id: requester,
        product_name: product_name.to_string(),
        product_description: req
            .product_description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        status: RequestStatus::Pending,
        created_at: Utc::now(),
    };
    db.insert_request(&request)?;

    info!(
        "Request {} for '{}' filed on trip {} by {}",
        request.id, request.product_name, trip.id, requester
    );
    Ok(request)
}

pub fn list_requests(db: &Database, trip_id: Uuid) -> Result<Vec<PurchaseRequest>, ApiError> {
    Ok(db.list_requests_for_trip(trip_id)?)
}

pub fn accept_request(db: &Database, caller: Uuid, id: Uuid) -> Result<PurchaseRequest, ApiError> {
    decide(db, caller, id, RequestStatus::Accepted)
}

pub fn reject_request(db: &Database, caller: Uuid, id: Uuid) -> Result<PurchaseRequest, ApiError> {
    decide(db, caller, id, RequestStatus::Rejected)
}

/// Only the traveler decides, and only while the request is still pending.
fn decide(
    db: &Database,
    caller: Uuid,
    id: Uuid,
    next: RequestStatus,
) -> Result<PurchaseRequest, ApiError> {
    let row = db.get_request(id)?.ok_or(ApiError::NotFound("request"))?;

    if row.trip_owner_id != caller {
        warn!("User {} tried to mark request {} {} without owning the trip", caller, id, next);
        return Err(ApiError::Forbidden("only the traveler can accept or reject a request"));
    }

    let current = row.request.status;
    if !current.can_transition_to(next) {
        return Err(transition_error(current, next));
    }

    if !db.transition_request(id, current, next)? {
        // Someone else moved it between our read and the update
        let latest = db.get_request(id)?.map_or(current, |r| r.request.status);
        return Err(transition_error(latest, next));
    }

    info!("Request {} {} by traveler {}", id, next, caller);
    Ok(PurchaseRequest {
        status: next,
        ..row.request
    })
}

fn transition_error(from: RequestStatus, to: RequestStatus) -> ApiError {
    ApiError::InvalidTransition {
        entity: "request",
        from: from.as_str(),
        to: to.as_str(),
    }
}

/// POST /requests
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = run_blocking(&state, move |s| create_request(&s.db, claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /requests/{id} (trip id)
pub async fn list(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = run_blocking(&state, move |s| list_requests(&s.db, trip_id)).await?;
    Ok(Json(requests))
}

/// PUT /requests/{id}/accept
pub async fn accept(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let request =
        run_blocking(&state, move |s| accept_request(&s.db, claims.sub, request_id)).await?;
    Ok(Json(request))
}

/// PUT /requests/{id}/reject
pub async fn reject(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let request =
        run_blocking(&state, move |s| reject_request(&s.db, claims.sub, request_id)).await?;
    Ok(Json(request))
}
