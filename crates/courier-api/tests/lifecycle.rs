mod common;

use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use courier_api::auth::{AppState, register_user};
use courier_api::error::ApiError;
use courier_api::messages::{list_messages, send_message};
use courier_api::payments::{create_escrow, get_escrow, refund_escrow, release_escrow};
use courier_api::requests::{accept_request, create_request, list_requests, reject_request};
use courier_api::trips::{get_trip, list_trips};
use courier_types::api::{
    CreateEscrowRequest, CreatePurchaseRequest, SendMessageRequest, SignupRequest,
};
use courier_types::models::{Escrow, EscrowStatus, Message, PurchaseRequest, RequestStatus, Trip};

use common::{add_user, delhi_to_goa, state};

/// Traveler T owns a trip; requester R may request on it; U is unrelated.
struct Market {
    state: AppState,
    traveler: Uuid,
    requester: Uuid,
    outsider: Uuid,
    trip: Trip,
}

impl Market {
    fn new() -> Self {
        let state = state();
        let traveler = add_user(&state.db, "traveler");
        let requester = add_user(&state.db, "requester");
        let outsider = add_user(&state.db, "outsider");
        let trip = delhi_to_goa(&state.db, traveler);
        Self {
            state,
            traveler,
            requester,
            outsider,
            trip,
        }
    }

    fn request(&self) -> PurchaseRequest {
        create_request(
            &self.state.db,
            self.requester,
            CreatePurchaseRequest {
                trip_id: self.trip.id,
                product_name: "Headphones".into(),
                product_description: Some("Noise cancelling".into()),
            },
        )
        .unwrap()
    }

    fn accepted_request(&self) -> PurchaseRequest {
        let request = self.request();
        accept_request(&self.state.db, self.traveler, request.id).unwrap()
    }

    fn escrow(&self, caller: Uuid, request_id: Uuid, amount_inr: f64) -> Result<Escrow, ApiError> {
        create_escrow(&self.state, caller, CreateEscrowRequest { request_id, amount_inr })
    }

    fn send(&self, sender: Uuid, request_id: Uuid, content: &str) -> Result<Message, ApiError> {
        send_message(
            &self.state.db,
            sender,
            SendMessageRequest {
                request_id,
                content: content.into(),
            },
        )
    }

    fn status_of(&self, request_id: Uuid) -> RequestStatus {
        self.state.db.get_request(request_id).unwrap().unwrap().request.status
    }
}

// -- Trips --

#[test]
fn trips_are_listed_and_fetched() {
    let m = Market::new();
    let fetched = get_trip(&m.state.db, m.trip.id).unwrap();
    assert_eq!(fetched.user_id, m.traveler);
    assert_eq!(fetched.origin, "Delhi");

    assert_eq!(list_trips(&m.state.db).unwrap().len(), 1);
    assert!(matches!(get_trip(&m.state.db, Uuid::new_v4()), Err(ApiError::NotFound(_))));
}

// -- Requests --

#[test]
fn new_request_is_pending_and_owned_by_caller() {
    let m = Market::new();
    let request = m.request();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.requester_id, m.requester);
    assert_eq!(request.trip_id, m.trip.id);

    let listed = list_requests(&m.state.db, m.trip.id).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, request.id);
}

#[test]
fn request_against_unknown_trip_is_not_found() {
    let m = Market::new();
    let result = create_request(
        &m.state.db,
        m.requester,
        CreatePurchaseRequest {
            trip_id: Uuid::new_v4(),
            product_name: "Headphones".into(),
            product_description: None,
        },
    );
    assert!(matches!(result, Err(ApiError::NotFound("trip"))));
}

#[test]
fn traveler_cannot_request_on_own_trip() {
    let m = Market::new();
    let result = create_request(
        &m.state.db,
        m.traveler,
        CreatePurchaseRequest {
            trip_id: m.trip.id,
            product_name: "Headphones".into(),
            product_description: None,
        },
    );
    assert!(matches!(result, Err(ApiError::Forbidden(_))));
}

#[test]
fn only_the_traveler_accepts_or_rejects() {
    let m = Market::new();
    let request = m.request();

    for caller in [m.requester, m.outsider] {
        let accepted = accept_request(&m.state.db, caller, request.id);
        let rejected = reject_request(&m.state.db, caller, request.id);
        assert!(matches!(accepted, Err(ApiError::Forbidden(_))));
        assert!(matches!(rejected, Err(ApiError::Forbidden(_))));
    }
    assert_eq!(m.status_of(request.id), RequestStatus::Pending);

    let accepted = accept_request(&m.state.db, m.traveler, request.id).unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    assert_eq!(m.status_of(request.id), RequestStatus::Accepted);
}

#[test]
fn decisions_are_final() {
    let m = Market::new();

    let accepted = m.accepted_request();
    assert!(matches!(
        reject_request(&m.state.db, m.traveler, accepted.id),
        Err(ApiError::InvalidTransition { from: "accepted", to: "rejected", .. })
    ));
    assert!(matches!(
        accept_request(&m.state.db, m.traveler, accepted.id),
        Err(ApiError::InvalidTransition { .. })
    ));

    let rejected = m.request();
    reject_request(&m.state.db, m.traveler, rejected.id).unwrap();
    assert!(matches!(
        accept_request(&m.state.db, m.traveler, rejected.id),
        Err(ApiError::InvalidTransition { from: "rejected", .. })
    ));
    assert_eq!(m.status_of(rejected.id), RequestStatus::Rejected);
}

#[test]
fn deciding_unknown_request_is_not_found() {
    let m = Market::new();
    assert!(matches!(
        accept_request(&m.state.db, m.traveler, Uuid::new_v4()),
        Err(ApiError::NotFound("request"))
    ));
    assert!(matches!(
        reject_request(&m.state.db, m.traveler, Uuid::new_v4()),
        Err(ApiError::NotFound("request"))
    ));
}

#[test]
fn racing_accept_and_reject_decide_once() {
    for _ in 0..20 {
        let m = Market::new();
        let request = m.request();

        let accept = {
            let state = Arc::clone(&m.state);
            let traveler = m.traveler;
            thread::spawn(move || accept_request(&state.db, traveler, request.id))
        };
        let reject = {
            let state = Arc::clone(&m.state);
            let traveler = m.traveler;
            thread::spawn(move || reject_request(&state.db, traveler, request.id))
        };

        let accepted = accept.join().unwrap();
        let rejected = reject.join().unwrap();
        let winner = match (&accepted, &rejected) {
            (Ok(_), Err(ApiError::InvalidTransition { .. })) => RequestStatus::Accepted,
            (Err(ApiError::InvalidTransition { .. }), Ok(_)) => RequestStatus::Rejected,
            other => panic!("expected exactly one decision to win, got {other:?}"),
        };
        assert_eq!(m.status_of(request.id), winner);
    }
}

// -- Escrow --

#[test]
fn escrow_needs_an_accepted_request() {
    let m = Market::new();

    let pending = m.request();
    assert!(matches!(m.escrow(m.requester, pending.id, 500.0), Err(ApiError::Forbidden(_))));

    let rejected = m.request();
    reject_request(&m.state.db, m.traveler, rejected.id).unwrap();
    assert!(matches!(m.escrow(m.requester, rejected.id, 500.0), Err(ApiError::Forbidden(_))));

    assert!(matches!(
        m.escrow(m.requester, Uuid::new_v4(), 500.0),
        Err(ApiError::NotFound("request"))
    ));
}

#[test]
fn only_the_requester_funds_escrow() {
    let m = Market::new();
    let request = m.accepted_request();

    assert!(matches!(m.escrow(m.traveler, request.id, 500.0), Err(ApiError::Forbidden(_))));
    assert!(matches!(m.escrow(m.outsider, request.id, 500.0), Err(ApiError::Forbidden(_))));
    assert!(!m.state.db.escrow_exists_for_request(request.id).unwrap());
}

#[test]
fn escrow_is_paid_on_creation_and_unique() {
    let m = Market::new();
    let request = m.accepted_request();

    let escrow = m.escrow(m.requester, request.id, 500.0).unwrap();
    assert_eq!(escrow.status, EscrowStatus::Paid);
    assert_eq!(escrow.request_id, request.id);
    assert_eq!(escrow.amount_inr, 500.0);
    assert!(escrow.provider_payment_id.starts_with("pay_"));

    assert!(matches!(m.escrow(m.requester, request.id, 300.0), Err(ApiError::Conflict(_))));
}

#[test]
fn escrow_amount_must_be_positive() {
    let m = Market::new();
    let request = m.accepted_request();
    for amount in [0.0, -10.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(m.escrow(m.requester, request.id, amount), Err(ApiError::BadRequest(_))));
    }
}

#[test]
fn caller_and_request_are_checked_before_amount() {
    let m = Market::new();
    let request = m.accepted_request();

    assert!(matches!(m.escrow(m.outsider, request.id, 0.0), Err(ApiError::Forbidden(_))));
    assert!(matches!(m.escrow(m.traveler, request.id, -5.0), Err(ApiError::Forbidden(_))));
    assert!(matches!(
        m.escrow(m.requester, Uuid::new_v4(), -1.0),
        Err(ApiError::NotFound("request"))
    ));

    let pending = m.request();
    assert!(matches!(m.escrow(m.requester, pending.id, 0.0), Err(ApiError::Forbidden(_))));
}

#[test]
fn release_and_refund_belong_to_different_parties() {
    let m = Market::new();
    let escrow = m.escrow(m.requester, m.accepted_request().id, 500.0).unwrap();

    // Cross-calls
    let db = &m.state.db;
    assert!(matches!(release_escrow(db, m.requester, escrow.id), Err(ApiError::Forbidden(_))));
    assert!(matches!(refund_escrow(db, m.traveler, escrow.id), Err(ApiError::Forbidden(_))));
    assert!(matches!(release_escrow(db, m.outsider, escrow.id), Err(ApiError::Forbidden(_))));
    assert!(matches!(refund_escrow(db, m.outsider, escrow.id), Err(ApiError::Forbidden(_))));

    let refunded = refund_escrow(&m.state.db, m.requester, escrow.id).unwrap();
    assert_eq!(refunded.status, EscrowStatus::Refunded);

    let other = m.escrow(m.requester, m.accepted_request().id, 250.0).unwrap();
    let released = release_escrow(&m.state.db, m.traveler, other.id).unwrap();
    assert_eq!(released.status, EscrowStatus::Released);
}

#[test]
fn resolved_escrow_stays_resolved() {
    let m = Market::new();
    let escrow = m.escrow(m.requester, m.accepted_request().id, 500.0).unwrap();

    refund_escrow(&m.state.db, m.requester, escrow.id).unwrap();
    assert!(matches!(
        release_escrow(&m.state.db, m.traveler, escrow.id),
        Err(ApiError::InvalidTransition { from: "refunded", to: "released", .. })
    ));
    assert!(matches!(
        refund_escrow(&m.state.db, m.requester, escrow.id),
        Err(ApiError::InvalidTransition { .. })
    ));
}

#[test]
fn unknown_escrow_is_not_found() {
    let m = Market::new();
    let id = Uuid::new_v4();
    let db = &m.state.db;
    assert!(matches!(release_escrow(db, m.traveler, id), Err(ApiError::NotFound("escrow"))));
    assert!(matches!(refund_escrow(db, m.requester, id), Err(ApiError::NotFound("escrow"))));
    assert!(matches!(get_escrow(db, m.requester, id), Err(ApiError::NotFound("escrow"))));
}

#[test]
fn escrow_is_visible_to_both_parties_only() {
    let m = Market::new();
    let escrow = m.escrow(m.requester, m.accepted_request().id, 500.0).unwrap();

    assert_eq!(get_escrow(&m.state.db, m.requester, escrow.id).unwrap().id, escrow.id);
    assert_eq!(get_escrow(&m.state.db, m.traveler, escrow.id).unwrap().id, escrow.id);
    assert!(matches!(get_escrow(&m.state.db, m.outsider, escrow.id), Err(ApiError::Forbidden(_))));
}

#[test]
fn racing_release_and_refund_resolve_once() {
    let m = Market::new();
    let escrow = m.escrow(m.requester, m.accepted_request().id, 500.0).unwrap();

    let release = {
        let state = Arc::clone(&m.state);
        let traveler = m.traveler;
        thread::spawn(move || release_escrow(&state.db, traveler, escrow.id))
    };
    let refund = {
        let state = Arc::clone(&m.state);
        let requester = m.requester;
        thread::spawn(move || refund_escrow(&state.db, requester, escrow.id))
    };

    let results = [release.join().unwrap(), refund.join().unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(ApiError::InvalidTransition { .. })))
    );

    let stored = get_escrow(&m.state.db, m.requester, escrow.id).unwrap();
    assert!(stored.status.is_terminal());
}

// -- Messages --

#[test]
fn messages_are_visible_to_the_two_parties_only() {
    let m = Market::new();
    let request = m.request();
    m.send(m.requester, request.id, "Can you find the black ones?").unwrap();

    assert_eq!(list_messages(&m.state.db, m.requester, request.id).unwrap().len(), 1);
    assert_eq!(list_messages(&m.state.db, m.traveler, request.id).unwrap().len(), 1);
    assert!(matches!(
        list_messages(&m.state.db, m.outsider, request.id),
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(m.send(m.outsider, request.id, "hi"), Err(ApiError::Forbidden(_))));
}

#[test]
fn receiver_is_always_the_counterpart() {
    let m = Market::new();
    let request = m.request();

    let from_requester = m.send(m.requester, request.id, "Hello").unwrap();
    assert_eq!(from_requester.receiver_id, m.traveler);

    let from_traveler = m.send(m.traveler, request.id, "Hi! Sure.").unwrap();
    assert_eq!(from_traveler.receiver_id, m.requester);

    let conversation = list_messages(&m.state.db, m.traveler, request.id).unwrap();
    let contents: Vec<&str> = conversation.iter().map(|msg| msg.content.as_str()).collect();
    assert_eq!(contents, vec!["Hello", "Hi! Sure."]);
    assert!(conversation[0].timestamp <= conversation[1].timestamp);
}

#[test]
fn messaging_unknown_request_or_sender_is_not_found() {
    let m = Market::new();
    let request = m.request();

    assert!(matches!(
        m.send(m.requester, Uuid::new_v4(), "hi"),
        Err(ApiError::NotFound("request"))
    ));
    assert!(matches!(m.send(Uuid::new_v4(), request.id, "hi"), Err(ApiError::NotFound("sender"))));
    assert!(matches!(
        list_messages(&m.state.db, m.requester, Uuid::new_v4()),
        Err(ApiError::NotFound("request"))
    ));
    assert!(matches!(m.send(m.requester, request.id, "   "), Err(ApiError::BadRequest(_))));
}

// -- Identity --

#[test]
fn duplicate_signup_creates_no_second_row() {
    let s = state();
    let signup = |username: &str, email: &str| {
        register_user(
            &s.db,
            SignupRequest {
                username: username.into(),
                email: email.into(),
                password: "correct horse".into(),
            },
        )
    };

    signup("alice", "alice@example.com").unwrap();
    assert!(matches!(signup("alice", "alice2@example.com"), Err(ApiError::Conflict(_))));

    let count: i64 = s
        .db
        .with_conn(|conn| {
            let sql = "SELECT COUNT(*) FROM users WHERE username = 'alice'";
            Ok(conn.query_row(sql, [], |r| r.get(0))?)
        })
        .unwrap();
    assert_eq!(count, 1);
}

// -- Full flow --

#[test]
fn delhi_to_goa_headphones() {
    let s = state();
    let a = add_user(&s.db, "a");
    let b = add_user(&s.db, "b");

    let trip = delhi_to_goa(&s.db, a);
    assert_eq!((trip.origin.as_str(), trip.destination.as_str()), ("Delhi", "Goa"));

    let request = create_request(
        &s.db,
        b,
        CreatePurchaseRequest {
            trip_id: trip.id,
            product_name: "Headphones".into(),
            product_description: None,
        },
    )
    .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    let request = accept_request(&s.db, a, request.id).unwrap();
    assert_eq!(request.status, RequestStatus::Accepted);

    let pay = CreateEscrowRequest {
        request_id: request.id,
        amount_inr: 500.0,
    };
    let escrow = create_escrow(&s, b, pay).unwrap();
    assert_eq!(escrow.status, EscrowStatus::Paid);

    let escrow = release_escrow(&s.db, a, escrow.id).unwrap();
    assert_eq!(escrow.status, EscrowStatus::Released);

    // Refunding after release is refused; the escrow stays released.
    assert!(matches!(
        refund_escrow(&s.db, b, escrow.id),
        Err(ApiError::InvalidTransition { from: "released", to: "refunded", .. })
    ));
    assert_eq!(get_escrow(&s.db, b, escrow.id).unwrap().status, EscrowStatus::Released);
}
