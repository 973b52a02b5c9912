//! Database row types and query outcomes.
//! Rows stay close to SQLite; conversion to pollchat-types models happens here
//! so callers above the DB layer only see typed ids and timestamps.

use anyhow::Result;
use pollchat_types::models::{ChatMessage, Poll, Role, User, UserId};

use crate::{parse_id, parse_ts};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

impl UserRow {
    pub fn to_user(&self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.parse::<Role>().map_err(anyhow::Error::msg)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub sent_at: String,
}

impl MessageRow {
    pub fn into_message(self, read_by: Vec<UserId>) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: parse_id(&self.id)?,
            sender: parse_id(&self.sender_id)?,
            recipient: parse_id(&self.recipient_id)?,
            body: self.body,
            timestamp: parse_ts(&self.sent_at)?,
            read_by,
        })
    }
}

#[derive(Debug)]
pub enum CreateUser {
    Created(User),
    UsernameTaken,
    EmailTaken,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MarkRead {
    /// Reader is now in the message's reader set. `newly_read` is false when
    /// it already was.
    Recorded {
        sender: UserId,
        recipient: UserId,
        newly_read: bool,
    },
    /// Reader is neither sender nor recipient of the message
    NotParticipant,
    NotFound,
}

#[derive(Debug)]
pub enum VoteOutcome {
    Recorded(Poll),
    NotFound,
    Expired,
    AlreadyVoted,
    InvalidOption,
}
