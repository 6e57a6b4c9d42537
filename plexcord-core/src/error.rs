//! Error types for plexcord-core

use thiserror::Error;

/// Main error type for the plexcord-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Alert websocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured media server is not among the account's resources
    #[error("{product} \"{name}\" not found")]
    ResourceNotFound { product: String, name: String },

    /// Media server or plex.tv API error
    #[error("Plex error: {0}")]
    Plex(String),

    /// Malformed playback alert
    #[error("invalid alert: {0}")]
    Alert(String),

    /// Presence channel error
    #[error("presence error: {0}")]
    Presence(String),

    /// Alert stream ended or the connection was dropped
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Whether the error should stop a listener for good.
    ///
    /// Everything except a missing server resource is retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ResourceNotFound { .. })
    }
}

/// Result type alias for plexcord-core
pub type Result<T> = std::result::Result<T, Error>;
