use std::sync::Arc;

use pollchat_auth::TokenCodec;
use pollchat_db::Store;
use pollchat_gateway::{ConnectionConfig, ConnectionRegistry, Relay};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Store,
    pub tokens: TokenCodec,
    pub relay: Relay,
    pub connection: ConnectionConfig,
}

impl AppStateInner {
    /// Wire the shared state. The connection registry is created here and
    /// owned by the relay; nothing else holds it.
    pub fn new(store: Store, tokens: TokenCodec, connection: ConnectionConfig) -> AppState {
        let relay = Relay::new(store.clone(), ConnectionRegistry::new());
        Arc::new(Self {
            store,
            tokens,
            relay,
            connection,
        })
    }
}
