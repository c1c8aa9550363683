/// Error types for the chat client
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Timeout or connectivity failure talking to the backend
    #[error("Network error: {0}")]
    Network(String),

    /// Rejected client-side before any call was made, or by the server as bad input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Expired or invalid credential
    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Malformed broker frame or unexpected payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Map an HTTP status returned by the backend to the error taxonomy
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ChatError::Auth(message),
            409 => ChatError::Conflict(message),
            400 | 422 => ChatError::Validation(message),
            _ => ChatError::Http { status, message },
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return ChatError::from_status(status.as_u16(), e.to_string());
        }
        if e.is_decode() {
            return ChatError::Protocol(format!("Invalid response body: {}", e));
        }
        ChatError::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
