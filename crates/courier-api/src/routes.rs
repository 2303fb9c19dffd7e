use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{messages, payments, requests, trips};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/ping", get(ping))
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/trips", get(trips::list))
        .route("/trips/{trip_id}", get(trips::get))
        .route("/requests/{id}", get(requests::list));

    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route("/trips", post(trips::create))
        .route("/requests", post(requests::create))
        .route("/requests/{id}/accept", put(requests::accept))
        .route("/requests/{id}/reject", put(requests::reject))
        .route("/messages", post(messages::send))
        .route("/messages/{request_id}", get(messages::list))
        .route("/payments/create", post(payments::create))
        .route("/payments/{id}", get(payments::get))
        .route("/payments/{id}/release", put(payments::release))
        .route("/payments/{id}/refund", put(payments::refund))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
