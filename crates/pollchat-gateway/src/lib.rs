//! Real-time messaging: who is connected, and what happens to each frame
//! they send.

pub mod connection;
pub mod registry;
pub mod relay;

pub use connection::{ConnectionConfig, handle_connection};
pub use registry::{ConnectionHandle, ConnectionRegistry, Outbound};
pub use relay::{Relay, RelayError};
