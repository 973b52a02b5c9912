use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical participant identity across the chat pathway.
pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Public user profile. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// One direct message inside a chat. Only `read_by` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: UserId,
    pub recipient: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub read_by: Vec<UserId>,
}

/// Unordered pair of chat participants.
///
/// Normalised so that `Participants::new(a, b) == Participants::new(b, a)`;
/// this is the key a chat is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Participants {
    low: UserId,
    high: UserId,
}

impl Participants {
    /// Returns `None` when both ids are the same user.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.low == id || self.high == id
    }

    /// The participant that is not `id`, if `id` is one of the pair.
    pub fn other(&self, id: UserId) -> Option<UserId> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub text: String,
    pub votes: u32,
    pub voters: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub options: Vec<PollOption>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl Poll {
    /// A poll with no expiry never expires. Expiry is inclusive: at the
    /// expiry instant the poll is closed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| now >= expiry)
    }

    pub fn has_voted(&self, voter: UserId) -> bool {
        self.options.iter().any(|o| o.voters.contains(&voter))
    }
}
