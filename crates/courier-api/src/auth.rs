use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use courier_db::Database;
use courier_types::api::{Claims, LoginRequest, SignupRequest, TokenResponse};
use courier_types::models::User;

use crate::error::ApiError;
use crate::payments::PaymentProvider;
use crate::run_blocking;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub payments: Box<dyn PaymentProvider>,
}

// -- Operations --

pub fn register_user(db: &Database, req: SignupRequest) -> Result<User, ApiError> {
    let username = req.username.trim();
    let email = req.email.trim();

    // Validate input
    let username_chars = username.chars().count();
    if !(3..=32).contains(&username_chars) {
        return Err(ApiError::bad_request("username must be 3-32 characters"));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("email address is not valid"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    if db.user_exists(username, email)? {
        return Err(ApiError::Conflict("username or email already exists"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        created_at: Utc::now(),
    };

    // A concurrent signup can still win the race between the check and the insert.
    db.create_user(&user, &password_hash).map_err(|e| {
        if courier_db::is_constraint_violation(&e) {
            ApiError::Conflict("username or email already exists")
        } else {
            ApiError::Internal(e)
        }
    })?;

    info!("User {} registered as {}", user.id, user.username);
    Ok(user)
}

pub fn issue_token(state: &AppStateInner, req: LoginRequest) -> Result<TokenResponse, ApiError> {
    let row = state
        .db
        .get_user_by_username(&req.username)?
        .ok_or(ApiError::Unauthorized("invalid credentials"))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| anyhow::anyhow!("stored hash for {} is corrupt: {}", row.user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Failed login for {}", row.user.username);
            ApiError::Unauthorized("invalid credentials")
        })?;

    let token = create_token(&state.jwt_secret, state.token_ttl, row.user.id, &row.user.username)?;
    Ok(TokenResponse::bearer(token))
}

pub fn create_token(
    secret: &str,
    ttl: Duration,
    user_id: Uuid,
    username: &str,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate signature and expiry of a bearer token.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("could not validate credentials"))?;

    Ok(token_data.claims)
}

// -- Handlers --

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(&state, move |s| register_user(&s.db, req)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = run_blocking(&state, move |s| issue_token(s, req)).await?;
    Ok(Json(token))
}

/// GET /me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = run_blocking(&state, move |s| {
        s.db.get_user_by_id(claims.sub)?.ok_or(ApiError::NotFound("user"))
    })
    .await?;
    Ok(Json(row.user))
}
