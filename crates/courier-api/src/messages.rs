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
use courier_db::models::RequestRow;
use courier_types::api::{Claims, SendMessageRequest};
use courier_types::models::Message;

use crate::access::{can_access_request, counterpart};
use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// Messages are private to the requester and the traveler; the receiver is
/// always whichever of the two did not send.
pub fn send_message(
    db: &Database,
    sender: Uuid,
    req: SendMessageRequest,
) -> Result<Message, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }

    db.get_user_by_id(sender)?.ok_or(ApiError::NotFound("sender"))?;
    let request = authorized_request(db, sender, req.request_id)?;
    let receiver =
        counterpart(sender, &request).ok_or(ApiError::Forbidden("not a party to this request"))?;

    let message = Message {
        id: Uuid::new_v4(),
        request_id: req.request_id,
        sender_id: sender,
        receiver_id: receiver,
        content: req.content,
        timestamp: Utc::now(),
    };
    db.insert_message(&message)?;

    info!(
        "Message {} on request {} from {} to {}",
        message.id, message.request_id, sender, receiver
    );
    Ok(message)
}

pub fn list_messages(
    db: &Database,
    caller: Uuid,
    request_id: Uuid,
) -> Result<Vec<Message>, ApiError> {
    authorized_request(db, caller, request_id)?;
    Ok(db.get_messages(request_id)?)
}

fn authorized_request(
    db: &Database,
    caller: Uuid,
    request_id: Uuid,
) -> Result<RequestRow, ApiError> {
    let request = db.get_request(request_id)?.ok_or(ApiError::NotFound("request"))?;
    if !can_access_request(caller, &request) {
        warn!("User {} denied access to messages of request {}", caller, request_id);
        return Err(ApiError::Forbidden("not a party to this request"));
    }
    Ok(request)
}

/// POST /messages
pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state, move |s| send_message(&s.db, claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/{request_id}
pub async fn list(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messages =
        run_blocking(&state, move |s| list_messages(&s.db, claims.sub, request_id)).await?;
    Ok(Json(messages))
}
