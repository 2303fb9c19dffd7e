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
use courier_db::models::EscrowRow;
use courier_types::api::{Claims, CreateEscrowRequest};
use courier_types::models::{Escrow, EscrowStatus, RequestStatus};

use crate::access::can_access_request;
use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;
use crate::run_blocking;

/// Collects the money that an escrow holds. Returns the provider's payment id
/// once the charge has settled.
pub trait PaymentProvider: Send + Sync {
    fn charge(&self, request_id: Uuid, amount_inr: f64) -> anyhow::Result<String>;
}

/// Settles every charge instantly with a made-up payment id.
pub struct SimulatedPayments;

impl PaymentProvider for SimulatedPayments {
    fn charge(&self, _request_id: Uuid, _amount_inr: f64) -> anyhow::Result<String> {
        let reference = Uuid::new_v4().simple().to_string();
        Ok(format!("pay_{}", &reference[..8]))
    }
}

/// Fund an escrow for an accepted request. Only the requester pays.
pub fn create_escrow(
    state: &AppStateInner,
    caller: Uuid,
    req: CreateEscrowRequest,
) -> Result<Escrow, ApiError> {
    let db = &state.db;
    let request = db.get_request(req.request_id)?.ok_or(ApiError::NotFound("request"))?;

    if request.request.requester_id != caller {
        warn!("User {} tried to pay for request {} they did not make", caller, req.request_id);
        return Err(ApiError::Forbidden("only the requester can create a payment"));
    }
    if request.request.status != RequestStatus::Accepted {
        return Err(ApiError::Forbidden(
            "payment can only be created after the traveler accepts the request",
        ));
    }
    if !req.amount_inr.is_finite() || req.amount_inr <= 0.0 {
        return Err(ApiError::bad_request("amount_inr must be a positive number"));
    }
    if db.escrow_exists_for_request(req.request_id)? {
        return Err(ApiError::Conflict("this request already has an escrow"));
    }

    // The charge settles before the row exists, so a stored escrow is never pending.
    let provider_payment_id = state.payments.charge(req.request_id, req.amount_inr)?;

    let escrow = Escrow {
        id: Uuid::new_v4(),
        request_id: req.request_id,
        amount_inr: req.amount_inr,
        provider_payment_id,
        status: EscrowStatus::Paid,
        created_at: Utc::now(),
    };
    db.insert_escrow(&escrow).map_err(|e| {
        if courier_db::is_constraint_violation(&e) {
            ApiError::Conflict("this request already has an escrow")
        } else {
            ApiError::Internal(e)
        }
    })?;

    info!(
        "Escrow {} funded for request {}: {} INR ({})",
        escrow.id, escrow.request_id, escrow.amount_inr, escrow.provider_payment_id
    );
    Ok(escrow)
}

/// Either party may look at the escrow of their request.
pub fn get_escrow(db: &Database, caller: Uuid, id: Uuid) -> Result<Escrow, ApiError> {
    let row = db.get_escrow(id)?.ok_or(ApiError::NotFound("escrow"))?;
    if !can_access_request(caller, &row.request) {
        return Err(ApiError::Forbidden("not a party to this request"));
    }
    Ok(row.escrow)
}

/// Traveler hands the held funds over: paid -> released.
pub fn release_escrow(db: &Database, caller: Uuid, id: Uuid) -> Result<Escrow, ApiError> {
    resolve(
        db,
        id,
        EscrowStatus::Released,
        |row| row.request.trip_owner_id == caller,
        "only the traveler can release funds",
    )
}

/// Requester takes the held funds back: paid -> refunded.
pub fn refund_escrow(db: &Database, caller: Uuid, id: Uuid) -> Result<Escrow, ApiError> {
    resolve(
        db,
        id,
        EscrowStatus::Refunded,
        |row| row.request.request.requester_id == caller,
        "only the requester can refund",
    )
}

fn resolve<F>(
    db: &Database,
    id: Uuid,
    next: EscrowStatus,
    allowed: F,
    denied: &'static str,
) -> Result<Escrow, ApiError>
where
    F: FnOnce(&EscrowRow) -> bool,
{
    let row = db.get_escrow(id)?.ok_or(ApiError::NotFound("escrow"))?;
    if !allowed(&row) {
        warn!("Escrow {} -> {} refused: {}", id, next, denied);
        return Err(ApiError::Forbidden(denied));
    }

    let current = row.escrow.status;
    if !current.can_transition_to(next) {
        return Err(transition_error(current, next));
    }
    if !db.transition_escrow(id, current, next)? {
        // Lost a release/refund race
        let latest = db.get_escrow(id)?.map_or(current, |r| r.escrow.status);
        return Err(transition_error(latest, next));
    }

    info!("Escrow {} {} (request {})", id, next, row.escrow.request_id);
    Ok(Escrow {
        status: next,
        ..row.escrow
    })
}

fn transition_error(from: EscrowStatus, to: EscrowStatus) -> ApiError {
    ApiError::InvalidTransition {
        entity: "escrow",
        from: from.as_str(),
        to: to.as_str(),
    }
}

/// POST /payments/create
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEscrowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let escrow = run_blocking(&state, move |s| create_escrow(s, claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(escrow)))
}

/// GET /payments/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(escrow_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let escrow = run_blocking(&state, move |s| get_escrow(&s.db, claims.sub, escrow_id)).await?;
    Ok(Json(escrow))
}

/// PUT /payments/{id}/release
pub async fn release(
    State(state): State<AppState>,
    Path(escrow_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let escrow = run_blocking(&state, move |s| release_escrow(&s.db, claims.sub, escrow_id)).await?;
    Ok(Json(escrow))
}

/// PUT /payments/{id}/refund
pub async fn refund(
    State(state): State<AppState>,
    Path(escrow_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let escrow = run_blocking(&state, move |s| refund_escrow(&s.db, claims.sub, escrow_id)).await?;
    Ok(Json(escrow))
}
