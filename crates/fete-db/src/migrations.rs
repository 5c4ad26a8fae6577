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
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                phone       TEXT,
                role        TEXT NOT NULL DEFAULT 'client',
                avatar      TEXT NOT NULL DEFAULT '',
                is_verified INTEGER NOT NULL DEFAULT 0,
                preferences TEXT NOT NULL DEFAULT '{}',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_users_role ON users(role);

            CREATE TABLE events (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                category    TEXT NOT NULL,
                images      TEXT NOT NULL DEFAULT '[]',
                details     TEXT NOT NULL DEFAULT '{}',
                services    TEXT NOT NULL DEFAULT '[]',
                testimonial TEXT,
                tags        TEXT NOT NULL DEFAULT '[]',
                is_active   INTEGER NOT NULL DEFAULT 1,
                is_featured INTEGER NOT NULL DEFAULT 0,
                created_by  TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_events_category ON events(category, is_active);
            CREATE INDEX idx_events_featured ON events(is_featured, is_active);

            CREATE TABLE bookings (
                id                TEXT PRIMARY KEY,
                client_id         TEXT NOT NULL REFERENCES users(id),
                service_type      TEXT NOT NULL,
                event_category    TEXT NOT NULL,
                event_details     TEXT NOT NULL DEFAULT '{}',
                consultation_date TEXT NOT NULL,
                duration          INTEGER NOT NULL DEFAULT 60,
                status            TEXT NOT NULL DEFAULT 'pending',
                amount            INTEGER NOT NULL,
                currency          TEXT NOT NULL DEFAULT 'USD',
                payment_intent_id TEXT,
                payment_status    TEXT NOT NULL DEFAULT 'pending',
                paid_at           TEXT,
                assigned_planner  TEXT REFERENCES users(id),
                note_client       TEXT,
                note_planner      TEXT,
                note_admin        TEXT,
                follow_up         TEXT NOT NULL DEFAULT '{\"required\":true,\"date\":null,\"completed\":false}',
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL
            );

            CREATE INDEX idx_bookings_client ON bookings(client_id, status);
            CREATE INDEX idx_bookings_planner ON bookings(assigned_planner, status);
            CREATE INDEX idx_bookings_consultation ON bookings(consultation_date);
            CREATE INDEX idx_bookings_payment_status ON bookings(payment_status);
            CREATE INDEX idx_bookings_intent ON bookings(payment_intent_id);

            CREATE TABLE messages (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT NOT NULL UNIQUE,
                chat_id      TEXT NOT NULL,
                sender_id    TEXT REFERENCES users(id),
                sender_type  TEXT NOT NULL,
                sender_name  TEXT NOT NULL,
                sender_email TEXT,
                content      TEXT NOT NULL,
                message_type TEXT NOT NULL DEFAULT 'text',
                attachments  TEXT NOT NULL DEFAULT '[]',
                is_read      INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, seq);
            CREATE INDEX idx_messages_sender ON messages(sender_id);

            CREATE TABLE message_reads (
                message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id    TEXT NOT NULL REFERENCES users(id),
                read_at    TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
