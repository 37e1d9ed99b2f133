//! `tenure-discord`: the Discord REST implementation of the engine's
//! `Directory` and `RoleApi` traits.
//!
//! Talks to the bot API (`/api/v10`) with a `Bot` token. Member listing is
//! paginated a thousand at a time; tenure is measured from `joined_at` in
//! whole UTC days when the page is read.

mod client;
pub mod error;
mod wire;


pub use client::{DiscordClient, DEFAULT_BASE_URL};
pub use error::DiscordError;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DiscordError>;
