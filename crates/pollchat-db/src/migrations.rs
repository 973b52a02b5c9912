use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'user',
            created_at  TEXT NOT NULL
        );

        -- One row per unordered participant pair; participant_low sorts first.
        CREATE TABLE IF NOT EXISTS chats (
            id                TEXT PRIMARY KEY,
            participant_low   TEXT NOT NULL REFERENCES users(id),
            participant_high  TEXT NOT NULL REFERENCES users(id),
            created_at        TEXT NOT NULL,
            UNIQUE(participant_low, participant_high)
        );

        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            chat_id         TEXT NOT NULL REFERENCES chats(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            recipient_id    TEXT NOT NULL REFERENCES users(id),
            body            TEXT NOT NULL,
            sent_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, seq);

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            reader_id   TEXT NOT NULL REFERENCES users(id),
            read_at     TEXT NOT NULL,
            PRIMARY KEY(message_id, reader_id)
        );

        CREATE TABLE IF NOT EXISTS polls (
            id           TEXT PRIMARY KEY,
            title        TEXT NOT NULL,
            created_by   TEXT NOT NULL REFERENCES users(id),
            created_at   TEXT NOT NULL,
            expiry_date  TEXT
        );

        CREATE TABLE IF NOT EXISTS poll_options (
            poll_id   TEXT NOT NULL REFERENCES polls(id),
            position  INTEGER NOT NULL,
            text      TEXT NOT NULL,
            votes     INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(poll_id, position)
        );

        -- The primary key is what limits a voter to one vote per poll.
        CREATE TABLE IF NOT EXISTS poll_votes (
            poll_id   TEXT NOT NULL REFERENCES polls(id),
            voter_id  TEXT NOT NULL REFERENCES users(id),
            position  INTEGER NOT NULL,
            voted_at  TEXT NOT NULL,
            PRIMARY KEY(poll_id, voter_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
