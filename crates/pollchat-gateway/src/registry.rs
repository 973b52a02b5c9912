use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use pollchat_types::events::ServerEvent;
use pollchat_types::models::UserId;

/// Close code for a socket displaced by a newer connection of the same user.
pub const CLOSE_REPLACED: u16 = 4000;

/// Instructions for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerEvent),
    Close { code: u16, reason: String },
}

pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// Sending half of one registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an event for the socket. False if the socket's writer is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(Outbound::Event(event)).is_ok()
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// In-memory map of user id -> live connection. At most one entry per user.
///
/// Every operation is synchronous and holds the lock only for the map access
/// itself, never across an await.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh connection for `user_id`. A connection it replaces is
    /// told to close, so no socket is left orphaned.
    pub fn register(&self, user_id: UserId) -> (ConnectionHandle, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            conn_id: Uuid::new_v4(),
            tx,
        };

        let previous = self.write().insert(user_id, handle.clone());
        if let Some(previous) = previous {
            info!(
                "{} reconnected, closing previous connection {}",
                user_id, previous.conn_id
            );
            previous.close(CLOSE_REPLACED, "replaced by a newer connection");
        }

        (handle, rx)
    }

    pub fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.read().get(&user_id).cloned()
    }

    /// Remove the entry for `user_id`, but only if `conn_id` still owns it.
    /// Returns whether an entry was removed.
    pub fn unregister(&self, user_id: UserId, conn_id: Uuid) -> bool {
        let mut map = self.write();
        match map.get(&user_id) {
            Some(current) if current.conn_id == conn_id => {
                map.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Best-effort delivery to the user's current connection.
    pub fn send_to(&self, user_id: UserId, event: ServerEvent) -> bool {
        self.lookup(user_id).is_some_and(|handle| handle.send(event))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, ConnectionHandle>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, ConnectionHandle>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
