pub mod auth;
pub mod chats;
pub mod error;
pub mod middleware;
pub mod polls;
pub mod routes;
pub mod state;
pub mod users;
pub mod ws;

pub use routes::build_router;
pub use state::{AppState, AppStateInner};
