/// Pollchat credential handling.
///
/// Session tokens are HS256 JWTs signed with a shared secret and never stored
/// server-side; a token stays valid until it expires. Passwords are hashed
/// with Argon2id and salted per user.

pub mod password;
pub mod token;

pub use password::{hash_password, verify_password};
pub use token::{TokenCodec, TokenError};
