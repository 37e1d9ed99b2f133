use thiserror::Error;

/// Failures while setting up the client. Failures of individual calls are
/// reported as [`tenure_core::api::ApiError`].
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("bot token is empty")]
    MissingToken,

    #[error("bot token contains characters that cannot be sent in a header")]
    InvalidToken,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
