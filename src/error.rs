//! Error Module
//!
//! Error types shared by the transport, RPC, authentication and client layers.

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connect failed after {attempts} attempts")]
    ConnectFailed { attempts: u32 },

    #[error("Dial timed out after {0} ms")]
    DialTimeout(u128),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Authentication is required")]
    AuthenticationRequired,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Request '{method}' timed out")]
    Timeout { method: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether the error means the connection is gone and `start()` must be
    /// called again before further calls can succeed.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectionClosed | ClientError::NotConnected | ClientError::WebSocket(_)
        )
    }
}

/// Result alias used throughout the crate
pub type ClientResult<T> = Result<T, ClientError>;
