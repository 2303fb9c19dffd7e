use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE trips (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                origin      TEXT NOT NULL,
                destination TEXT NOT NULL,
                travel_date TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE requests (
                id                  TEXT PRIMARY KEY,
                trip_id             TEXT NOT NULL REFERENCES trips(id),
                requester_id        TEXT NOT NULL REFERENCES users(id),
                product_name        TEXT NOT NULL,
                product_description TEXT,
                status              TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_requests_trip ON requests(trip_id, created_at);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                request_id  TEXT NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_request ON messages(request_id, created_at);

            CREATE TABLE escrows (
                id                  TEXT PRIMARY KEY,
                request_id          TEXT NOT NULL UNIQUE REFERENCES requests(id) ON DELETE CASCADE,
                amount_inr          REAL NOT NULL,
                provider_payment_id TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'paid', 'released', 'refunded')),
                created_at          TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
