use std::io;

/// Errors reported by the `wscall` client.
///
/// Connection-level failures (refused connects, dropped sockets) are recovered
/// by the watchdog and never show up here. Only call-level outcomes do.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not connected")]
    NotConnected,
    #[error("timed out")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("call failed with error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
