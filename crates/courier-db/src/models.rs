//! Database row types. Domain entities come straight from `courier-types`;
//! these cover the rows that carry more than the public model.

use courier_types::models::{Escrow, PurchaseRequest, User};
use uuid::Uuid;

pub struct UserRow {
    pub user: User,
    pub password: String,
}

/// A request joined with the owner of the trip it was made against.
#[derive(Debug, Clone)]
pub struct RequestRow {
    pub request: PurchaseRequest,
    pub trip_owner_id: Uuid,
}

/// An escrow joined with the request (and trip owner) it settles.
#[derive(Debug, Clone)]
pub struct EscrowRow {
    pub escrow: Escrow,
    pub request: RequestRow,
}
