//! Transport Module
//!
//! Dials the venue WebSocket endpoint. Supports both TLS and non-TLS
//! connections using tokio-tungstenite.

use crate::error::{ClientError, ClientResult};

use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// One live duplex connection to the venue
pub type Connection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial `url`, bounding the TCP connect and WebSocket handshake by `timeout`.
///
/// The socket is dropped on every failure path, including a handshake that
/// times out halfway.
pub async fn dial(url: &str, timeout: Duration) -> ClientResult<Connection> {
    let handshake = async {
        if url.starts_with("wss://") {
            connect_tls(url).await
        } else {
            connect_plain(url).await
        }
    };

    match tokio::time::timeout(timeout, handshake).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::DialTimeout(timeout.as_millis())),
    }
}

/// Connect without TLS
async fn connect_plain(url: &str) -> ClientResult<Connection> {
    let (ws_stream, _) = connect_async(url).await?;
    log::info!("WebSocket connection established (non-TLS)");
    Ok(ws_stream)
}

/// Connect with TLS
async fn connect_tls(url: &str) -> ClientResult<Connection> {
    let connector = native_tls::TlsConnector::builder()
        .build()
        .map_err(|e| ClientError::Tls(e.to_string()))?;

    let (ws_stream, _) = tokio_tungstenite::connect_async_tls_with_config(
        url,
        None,
        false,
        Some(tokio_tungstenite::Connector::NativeTls(connector)),
    )
    .await?;

    log::info!("WebSocket connection established (TLS)");
    Ok(ws_stream)
}
