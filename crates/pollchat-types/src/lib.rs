//! Wire and domain types shared by every Pollchat crate.

pub mod api;
pub mod events;
pub mod models;
