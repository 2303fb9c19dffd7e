#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use courier_api::auth::{AppState, AppStateInner};
use courier_api::payments::SimulatedPayments;
use courier_api::trips::create_trip;
use courier_db::Database;
use courier_types::api::CreateTripRequest;
use courier_types::models::{Trip, User};

pub const JWT_SECRET: &str = "test-secret";

/// Fresh state over a private in-memory database.
pub fn state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("in-memory database"),
        jwt_secret: JWT_SECRET.to_string(),
        token_ttl: Duration::minutes(60),
        payments: Box::new(SimulatedPayments),
    })
}

/// Insert a user directly, skipping password hashing.
pub fn add_user(db: &Database, name: &str) -> Uuid {
    let user = User {
        id: Uuid::new_v4(),
        username: name.to_string(),
        email: format!("{name}@example.com"),
        created_at: Utc::now(),
    };
    db.create_user(&user, "not-a-real-hash").expect("insert user");
    user.id
}

pub fn delhi_to_goa(db: &Database, traveler: Uuid) -> Trip {
    create_trip(
        db,
        traveler,
        CreateTripRequest {
            origin: "Delhi".into(),
            destination: "Goa".into(),
            travel_date: Utc::now() + Duration::days(10),
        },
    )
    .expect("create trip")
}
