use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use courier_types::models::{
    Escrow, EscrowStatus, Message, PurchaseRequest, RequestStatus, Trip, User,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::Database;
use crate::models::{EscrowRow, RequestRow, UserRow};

const USER_COLUMNS: &str = "id, username, email, password, created_at";
const TRIP_COLUMNS: &str = "id, user_id, origin, destination, travel_date, created_at";

// Requests are always read together with the trip owner.
const REQUEST_SELECT: &str = "SELECT r.id, r.trip_id, r.requester_id, r.product_name,
            r.product_description, r.status, r.created_at, t.user_id
     FROM requests r
     JOIN trips t ON t.id = r.trip_id";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &User, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.email,
                    password_hash,
                    encode_ts(&user.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id.to_string()))
    }

    /// True if either the username or the email is already registered.
    pub fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1 OR email = ?2 LIMIT 1",
                    params![username, email],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Trips --

    pub fn insert_trip(&self, trip: &Trip) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO trips (id, user_id, origin, destination, travel_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    trip.id.to_string(),
                    trip.user_id.to_string(),
                    trip.origin,
                    trip.destination,
                    encode_ts(&trip.travel_date),
                    encode_ts(&trip.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_trip(&self, id: Uuid) -> Result<Option<Trip>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1");
            let trip = conn.query_row(&sql, [id.to_string()], map_trip).optional()?;
            Ok(trip)
        })
    }

    pub fn list_trips(&self) -> Result<Vec<Trip>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {TRIP_COLUMNS} FROM trips ORDER BY travel_date, created_at");
            let mut stmt = conn.prepare(&sql)?;
            let trips = stmt
                .query_map([], map_trip)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(trips)
        })
    }

    // -- Requests --

    pub fn insert_request(&self, request: &PurchaseRequest) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO requests (id, trip_id, requester_id, product_name,
                                       product_description, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.id.to_string(),
                    request.trip_id.to_string(),
                    request.requester_id.to_string(),
                    request.product_name,
                    request.product_description,
                    request.status.as_str(),
                    encode_ts(&request.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_request(&self, id: Uuid) -> Result<Option<RequestRow>> {
        self.with_conn(|conn| {
            let sql = format!("{REQUEST_SELECT} WHERE r.id = ?1");
            let row = conn
                .query_row(&sql, [id.to_string()], |row| map_request(row, 0))
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_requests_for_trip(&self, trip_id: Uuid) -> Result<Vec<PurchaseRequest>> {
        self.with_conn(|conn| {
            let sql =
                format!("{REQUEST_SELECT} WHERE r.trip_id = ?1 ORDER BY r.created_at, r.rowid");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([trip_id.to_string()], |row| map_request(row, 0).map(|r| r.request))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move a request from `from` to `to`. Returns false when the stored status
    /// was no longer `from`, which leaves the row untouched.
    pub fn transition_request(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE requests SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![to.as_str(), id.to_string(), from.as_str()],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, request_id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.request_id.to_string(),
                    message.sender_id.to_string(),
                    message.receiver_id.to_string(),
                    message.content,
                    encode_ts(&message.timestamp),
                ],
            )?;
            Ok(())
        })
    }

    /// All messages for a request, oldest first.
    pub fn get_messages(&self, request_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, request_id, sender_id, receiver_id, content, created_at
                 FROM messages
                 WHERE request_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([request_id.to_string()], |row| {
                    Ok(Message {
                        id: col(row, 0)?,
                        request_id: col(row, 1)?,
                        sender_id: col(row, 2)?,
                        receiver_id: col(row, 3)?,
                        content: row.get(4)?,
                        timestamp: col(row, 5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Escrows --

    pub fn insert_escrow(&self, escrow: &Escrow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO escrows (id, request_id, amount_inr, provider_payment_id,
                                      status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    escrow.id.to_string(),
                    escrow.request_id.to_string(),
                    escrow.amount_inr,
                    escrow.provider_payment_id,
                    escrow.status.as_str(),
                    encode_ts(&escrow.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_escrow(&self, id: Uuid) -> Result<Option<EscrowRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT e.id, e.request_id, e.amount_inr, e.provider_payment_id,
                            e.status, e.created_at,
                            r.id, r.trip_id, r.requester_id, r.product_name,
                            r.product_description, r.status, r.created_at, t.user_id
                     FROM escrows e
                     JOIN requests r ON r.id = e.request_id
                     JOIN trips t ON t.id = r.trip_id
                     WHERE e.id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(EscrowRow {
                            escrow: Escrow {
                                id: col(row, 0)?,
                                request_id: col(row, 1)?,
                                amount_inr: row.get(2)?,
                                provider_payment_id: row.get(3)?,
                                status: col(row, 4)?,
                                created_at: col(row, 5)?,
                            },
                            request: map_request(row, 6)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn escrow_exists_for_request(&self, request_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM escrows WHERE request_id = ?1",
                    [request_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Same contract as [`Database::transition_request`].
    pub fn transition_escrow(
        &self,
        id: Uuid,
        from: EscrowStatus,
        to: EscrowStatus,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE escrows SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![to.as_str(), id.to_string(), from.as_str()],
            )?;
            Ok(changed == 1)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                user: User {
                    id: col(row, 0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    created_at: col(row, 4)?,
                },
                password: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_trip(row: &Row<'_>) -> rusqlite::Result<Trip> {
    Ok(Trip {
        id: col(row, 0)?,
        user_id: col(row, 1)?,
        origin: row.get(2)?,
        destination: row.get(3)?,
        travel_date: col(row, 4)?,
        created_at: col(row, 5)?,
    })
}

/// Reads the `REQUEST_SELECT` column layout starting at `offset`.
fn map_request(row: &Row<'_>, offset: usize) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        request: PurchaseRequest {
            id: col(row, offset)?,
            trip_id: col(row, offset + 1)?,
            requester_id: col(row, offset + 2)?,
            product_name: row.get(offset + 3)?,
            product_description: row.get(offset + 4)?,
            status: col(row, offset + 5)?,
            created_at: col(row, offset + 6)?,
        },
        trip_owner_id: col(row, offset + 7)?,
    })
}

/// Parse a TEXT column into a typed value (uuid, timestamp, status).
fn col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Fixed-width UTC timestamps so that text order is chronological order.
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
