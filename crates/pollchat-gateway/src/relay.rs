use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use pollchat_db::models::MarkRead;
use pollchat_db::{Store, StoreError};
use pollchat_types::events::{ClientEvent, ServerEvent};
use pollchat_types::models::{Participants, UserId};

use crate::registry::ConnectionRegistry;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Invalid(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not a participant of this conversation")]
    NotParticipant,

    #[error("storage unavailable, event not applied")]
    Store(#[from] StoreError),
}

/// Applies inbound events: persists them, then forwards derived events to
/// whichever other party is connected.
#[derive(Clone)]
pub struct Relay {
    store: Store,
    registry: ConnectionRegistry,
}

impl Relay {
    pub fn new(store: Store, registry: ConnectionRegistry) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Handle one raw text frame from `from`. The returned event, if any, is
    /// the reply for the originating socket only.
    pub async fn handle_text(&self, from: UserId, text: &str) -> Option<ServerEvent> {
        match ClientEvent::parse(text) {
            Ok(event) => self.handle(from, event).await,
            Err(e) => {
                warn!("{} sent a bad frame: {}", from, e);
                Some(ServerEvent::error(e.to_string()))
            }
        }
    }

    pub async fn handle(&self, from: UserId, event: ClientEvent) -> Option<ServerEvent> {
        let kind = event.kind();
        let result = match event {
            ClientEvent::SendMessage {
                recipient,
                body,
                temp_id,
            } => self.send_message(from, recipient, body, temp_id).await,
            ClientEvent::ReadReceipt { message_id } => self.read_receipt(from, message_id).await,
            ClientEvent::FetchMessages { participants } => {
                self.fetch_messages(from, participants).await
            }
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    RelayError::Store(source) => error!("{} from {} failed: {}", kind, from, source),
                    other => warn!("{} from {} rejected: {}", kind, from, other),
                }
                Some(ServerEvent::error(e.to_string()))
            }
        }
    }

    async fn send_message(
        &self,
        from: UserId,
        recipient: UserId,
        body: String,
        temp_id: Option<String>,
    ) -> Result<Option<ServerEvent>, RelayError> {
        if recipient == from {
            return Err(RelayError::Invalid("cannot send a message to yourself"));
        }

        let message = self
            .store
            .call(move |db| db.append_message(from, recipient, &body))
            .await?
            .ok_or(RelayError::NotFound("recipient"))?;

        let delivered = self.registry.send_to(
            recipient,
            ServerEvent::SendMessage {
                message: message.clone(),
                temp_id: None,
            },
        );
        debug!(
            "message {} from {} to {} persisted (delivered live: {})",
            message.id, from, recipient, delivered
        );

        Ok(Some(ServerEvent::SendMessage { message, temp_id }))
    }

    async fn read_receipt(
        &self,
        reader: UserId,
        message_id: Uuid,
    ) -> Result<Option<ServerEvent>, RelayError> {
        match self.store.call(move |db| db.mark_read(message_id, reader)).await? {
            MarkRead::NotFound => Err(RelayError::NotFound("message")),
            MarkRead::NotParticipant => Err(RelayError::NotParticipant),
            MarkRead::Recorded { sender, newly_read, .. } => {
                debug!("{} read message {} (new: {})", reader, message_id, newly_read);
                if sender != reader {
                    self.registry.send_to(
                        sender,
                        ServerEvent::ReadReceipt {
                            message_id,
                            reader_id: reader,
                        },
                    );
                }
                Ok(None)
            }
        }
    }

    async fn fetch_messages(
        &self,
        from: UserId,
        participants: [UserId; 2],
    ) -> Result<Option<ServerEvent>, RelayError> {
        let pair = Participants::new(participants[0], participants[1])
            .ok_or(RelayError::Invalid("participants must be two distinct users"))?;
        if !pair.contains(from) {
            return Err(RelayError::NotParticipant);
        }

        let messages = self
            .store
            .call(move |db| db.get_chat_messages(&pair))
            .await?
            .unwrap_or_default();

        Ok(Some(ServerEvent::FetchMessages {
            participants,
            messages,
        }))
    }
}
