use std::collections::HashMap;

use anyhow::{Result, anyhow};
use rusqlite::{Connection, params};
use uuid::Uuid;

use pollchat_types::models::{ChatMessage, Participants, Role, User, UserId};

use crate::models::{CreateUser, MarkRead, MessageRow, UserRow};
use crate::{Database, format_ts, now, parse_id};

impl Database {
    // -- Users --

    /// Insert a new account. The first account on an empty database becomes
    /// an admin; every later one is a plain user.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<CreateUser> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_user_by_username(&tx, username)?.is_some() {
                return Ok(CreateUser::UsernameTaken);
            }

            // users.email is COLLATE NOCASE, so this match ignores case
            let email_taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            if email_taken {
                return Ok(CreateUser::EmailTaken);
            }

            let existing: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let role = if existing == 0 { Role::Admin } else { Role::User };

            let id = Uuid::new_v4();
            let created_at = now();
            tx.execute(
                "INSERT INTO users (id, username, email, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    username,
                    email,
                    password_hash,
                    role.as_str(),
                    format_ts(created_at)
                ],
            )?;
            tx.commit()?;

            Ok(CreateUser::Created(User {
                id,
                username: username.to_string(),
                email: email.to_string(),
                role,
                created_at,
            }))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.with_conn(|conn| {
            query_user_by_id(conn, &id.to_string())?
                .map(|row| row.to_user())
                .transpose()
        })
    }

    /// Every user except `id`, ordered by username.
    pub fn list_users_except(&self, id: UserId) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, email, password, role, created_at
                 FROM users WHERE id != ?1 ORDER BY username",
            )?;

            let rows = stmt
                .query_map([id.to_string()], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.iter().map(UserRow::to_user).collect()
        })
    }

    // -- Chats --

    /// Append a message to the chat between `sender` and `recipient`.
    ///
    /// The chat is found or created and the message inserted in one
    /// transaction, so two first messages racing between the same pair still
    /// land in a single chat. Returns `None` if either user does not exist.
    pub fn append_message(
        &self,
        sender: UserId,
        recipient: UserId,
        body: &str,
    ) -> Result<Option<ChatMessage>> {
        let pair = Participants::new(sender, recipient)
            .ok_or_else(|| anyhow!("sender and recipient are the same user"))?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let known: i64 = tx.query_row(
                "SELECT COUNT(*) FROM users WHERE id IN (?1, ?2)",
                params![sender.to_string(), recipient.to_string()],
                |row| row.get(0),
            )?;
            if known != 2 {
                return Ok(None);
            }

            let chat_id = upsert_chat(&tx, &pair)?;

            let message = ChatMessage {
                id: Uuid::new_v4(),
                sender,
                recipient,
                body: body.to_string(),
                timestamp: now(),
                read_by: vec![],
            };

            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, recipient_id, body, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    chat_id,
                    sender.to_string(),
                    recipient.to_string(),
                    message.body,
                    format_ts(message.timestamp)
                ],
            )?;
            tx.commit()?;

            Ok(Some(message))
        })
    }

    /// All messages between the pair in send order, or `None` if the pair
    /// has never exchanged a message.
    pub fn get_chat_messages(&self, pair: &Participants) -> Result<Option<Vec<ChatMessage>>> {
        self.with_conn(|conn| {
            let chat_id: Option<String> = conn
                .query_row(
                    "SELECT id FROM chats WHERE participant_low = ?1 AND participant_high = ?2",
                    params![pair.low().to_string(), pair.high().to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(chat_id) = chat_id else {
                return Ok(None);
            };

            let mut readers = query_readers(conn, &chat_id)?;

            let mut stmt = conn.prepare(
                "SELECT id, sender_id, recipient_id, body, sent_at
                 FROM messages WHERE chat_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map([&chat_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        recipient_id: row.get(2)?,
                        body: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|row| {
                    let read_by = readers.remove(&row.id).unwrap_or_default();
                    row.into_message(read_by)
                })
                .collect::<Result<Vec<_>>>()
                .map(Some)
        })
    }

    /// Add `reader` to the message's reader set. Idempotent.
    pub fn mark_read(&self, message_id: Uuid, reader: UserId) -> Result<MarkRead> {
        self.with_conn(|conn| {
            let found: Option<(String, String)> = conn
                .query_row(
                    "SELECT sender_id, recipient_id FROM messages WHERE id = ?1",
                    [message_id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((sender, recipient)) = found else {
                return Ok(MarkRead::NotFound);
            };
            let sender = parse_id(&sender)?;
            let recipient = parse_id(&recipient)?;

            if reader != sender && reader != recipient {
                return Ok(MarkRead::NotParticipant);
            }

            let inserted = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, reader_id, read_at) VALUES (?1, ?2, ?3)",
                params![message_id.to_string(), reader.to_string(), format_ts(now())],
            )?;

            Ok(MarkRead::Recorded {
                sender,
                recipient,
                newly_read: inserted == 1,
            })
        })
    }
}

fn upsert_chat(conn: &Connection, pair: &Participants) -> Result<String> {
    conn.execute(
        "INSERT INTO chats (id, participant_low, participant_high, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(participant_low, participant_high) DO NOTHING",
        params![
            Uuid::new_v4().to_string(),
            pair.low().to_string(),
            pair.high().to_string(),
            format_ts(now())
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM chats WHERE participant_low = ?1 AND participant_high = ?2",
        params![pair.low().to_string(), pair.high().to_string()],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// message_id -> reader ids, in the order the reads were recorded.
fn query_readers(conn: &Connection, chat_id: &str) -> Result<HashMap<String, Vec<UserId>>> {
    let mut stmt = conn.prepare(
        "SELECT r.message_id, r.reader_id
         FROM message_reads r
         JOIN messages m ON m.id = r.message_id
         WHERE m.chat_id = ?1
         ORDER BY r.read_at, r.rowid",
    )?;

    let pairs = stmt
        .query_map([chat_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut readers: HashMap<String, Vec<UserId>> = HashMap::new();
    for (message_id, reader_id) in pairs {
        readers.entry(message_id).or_default().push(parse_id(&reader_id)?);
    }
    Ok(readers)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, email, password, role, created_at FROM users WHERE username = ?1",
    )?;

    let row = stmt.query_row([username], user_from_row).optional()?;

    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, email, password, role, created_at FROM users WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], user_from_row).optional()?;

    Ok(row)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
