use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::{AppState, decode_token};
use crate::error::ApiError;
use crate::run_blocking;

/// Extract and validate the bearer token, then make sure its user still exists.
/// On success the `Claims` are available to handlers as an extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized("not authenticated"))?;

    let claims = decode_token(&state.jwt_secret, token)?;

    let user_id = claims.sub;
    let known = run_blocking(&state, move |s| Ok(s.db.get_user_by_id(user_id)?.is_some())).await?;
    if !known {
        return Err(ApiError::Unauthorized("could not validate credentials"));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
