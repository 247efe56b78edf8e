//! RPC Transport Module
//!
//! JSON-RPC over one WebSocket connection. Outbound calls are correlated with
//! their responses by a locally generated id; unsolicited notifications are
//! handed to a single [`NotificationHandler`].
//!
//! Two tasks own the socket: a writer draining an outbound queue and a reader
//! that resolves pending calls and forwards notifications. When either side
//! sees the connection end, the `disconnected` token fires and every pending
//! call fails with [`ClientError::ConnectionClosed`].

use crate::error::{ClientError, ClientResult};
use crate::protocol::{
    self, HeartbeatKind, Incoming, Notification, Request, RpcError, RpcRequest, Test,
};
use crate::stats::LatencyTracker;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

/// Receiver of server-to-client notifications
pub trait NotificationHandler: Send + Sync + 'static {
    fn on_notification(&self, notification: Notification);
}

impl<F> NotificationHandler for F
where
    F: Fn(Notification) + Send + Sync + 'static,
{
    fn on_notification(&self, notification: Notification) {
        self(notification)
    }
}

/// Per-connection RPC settings
#[derive(Debug, Clone)]
pub struct RpcOptions {
    pub request_timeout: Duration,
    /// Log every raw frame sent and received
    pub debug: bool,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            debug: false,
        }
    }
}

struct PendingCall {
    sent_at: Instant,
    tx: oneshot::Sender<Result<Value, RpcError>>,
}

struct Shared {
    out_tx: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_id: AtomicU64,
    disconnected: CancellationToken,
    shutdown: CancellationToken,
    latency: Arc<Mutex<LatencyTracker>>,
    options: RpcOptions,
}

/// Handle to a live RPC connection.
///
/// Dropping the handle closes the connection.
pub struct RpcConnection {
    shared: Arc<Shared>,
}

impl RpcConnection {
    /// Take ownership of `stream` and start the reader and writer tasks.
    ///
    /// `shutdown` is the client lifecycle token: cancelling it fails in-flight
    /// calls with [`ClientError::Cancelled`] and closes the socket.
    pub fn new<S>(
        stream: S,
        handler: Arc<dyn NotificationHandler>,
        shutdown: CancellationToken,
        latency: Arc<Mutex<LatencyTracker>>,
        options: RpcOptions,
    ) -> Self
    where
        S: Stream<Item = Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Unpin
            + Send
            + 'static,
    {
        let (write, read) = stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            out_tx,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            disconnected: CancellationToken::new(),
            shutdown,
            latency,
            options,
        });

        tokio::spawn(write_loop(
            write,
            out_rx,
            shared.disconnected.clone(),
            shared.shutdown.clone(),
        ));
        tokio::spawn(read_loop(read, shared.clone(), handler));

        Self { shared }
    }

    /// Issue `method` and wait for its response
    pub async fn call(&self, method: &str, params: Value) -> ClientResult<Value> {
        self.shared.call(method, params).await
    }

    /// Token cancelled once the connection is gone
    pub fn disconnect_notify(&self) -> CancellationToken {
        self.shared.disconnected.clone()
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.disconnected.is_cancelled()
    }

    /// Number of calls awaiting a response
    pub fn pending_calls(&self) -> usize {
        self.shared.pending().len()
    }

    /// Close the connection, failing all pending calls
    pub fn close(&self) {
        self.shared.disconnected.cancel();
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.shared.disconnected.cancel();
    }
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Error for a call cut off by the connection going away. A teardown
    /// caused by the lifecycle token reports cancellation.
    fn closed_error(&self) -> ClientError {
        if self.shutdown.is_cancelled() {
            ClientError::Cancelled
        } else {
            ClientError::ConnectionClosed
        }
    }

    async fn call(&self, method: &str, params: Value) -> ClientResult<Value> {
        if self.shutdown.is_cancelled() || self.disconnected.is_cancelled() {
            return Err(self.closed_error());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&RpcRequest::new(id, method, &params))?;

        let (tx, rx) = oneshot::channel();
        self.pending().insert(
            id,
            PendingCall {
                sent_at: Instant::now(),
                tx,
            },
        );

        if self.options.debug {
            log::debug!("Sending: {}", text);
        }
        if self.out_tx.send(Message::Text(text)).is_err() {
            self.pending().remove(&id);
            return Err(self.closed_error());
        }

        let outcome = tokio::select! {
            biased;
            answer = rx => match answer {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(error)) => Err(ClientError::Rpc {
                    code: error.code,
                    message: error.message,
                }),
                // Sender dropped: the reader failed every pending call
                Err(_) => Err(self.closed_error()),
            },
            _ = self.shutdown.cancelled() => Err(ClientError::Cancelled),
            _ = self.disconnected.cancelled() => Err(self.closed_error()),
            _ = tokio::time::sleep(self.options.request_timeout) => Err(ClientError::Timeout {
                method: method.to_string(),
            }),
        };

        if outcome.is_err() {
            self.pending().remove(&id);
        }
        outcome
    }

    fn resolve(&self, id: u64, result: Result<Value, RpcError>) {
        let Some(call) = self.pending().remove(&id) else {
            log::warn!("Received response for unknown request id: {}", id);
            return;
        };

        let rtt = self
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_response(call.sent_at);
        log::trace!("Request {} answered in {} ns", id, rtt);

        // The caller may have given up already
        let _ = call.tx.send(result);
    }

    fn fail_all_pending(&self) {
        let drained: Vec<_> = self.pending().drain().collect();
        if !drained.is_empty() {
            log::warn!("Connection lost with {} pending calls", drained.len());
        }
        // Dropping each sender wakes its caller with ConnectionClosed
        drop(drained);
    }
}

async fn write_loop<W>(
    mut write: W,
    mut out_rx: mpsc::UnboundedReceiver<Message>,
    disconnected: CancellationToken,
    shutdown: CancellationToken,
) where
    W: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                log::info!("Shutting down connection");
                let _ = write.send(Message::Close(None)).await;
                disconnected.cancel();
                break;
            }
            _ = disconnected.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = out_rx.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = write.send(msg).await {
                        log::error!("WebSocket send failed: {}", e);
                        disconnected.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }

    let _ = write.close().await;
}

async fn read_loop<R>(mut read: R, shared: Arc<Shared>, handler: Arc<dyn NotificationHandler>)
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = shared.disconnected.cancelled() => break,
            _ = shared.shutdown.cancelled() => break,
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if shared.options.debug {
                    log::debug!("Received: {}", text);
                }
                handle_text(&shared, handler.as_ref(), &text);
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = shared.out_tx.send(Message::Pong(data));
            }
            Some(Ok(Message::Close(frame))) => {
                log::info!("Connection closed: {:?}", frame);
                break;
            }
            // Ignore other message types (Binary, Pong, Frame)
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                log::error!("WebSocket error: {}", e);
                break;
            }
            None => {
                log::info!("Connection stream ended");
                break;
            }
        }
    }

    shared.disconnected.cancel();
    shared.fail_all_pending();
}

fn handle_text(shared: &Arc<Shared>, handler: &dyn NotificationHandler, text: &str) {
    let msg = match protocol::parse_message(text) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("Failed to parse message: {} - {}", e, text);
            return;
        }
    };

    match msg {
        Incoming::Response { id, result } => shared.resolve(id, result),
        Incoming::Notification(notification) => {
            if let Notification::Heartbeat(HeartbeatKind::TestRequest) = notification {
                answer_test_request(shared.clone());
            }
            handler.on_notification(notification);
        }
        Incoming::Unknown(method) => {
            log::debug!("Received unknown notification method: {}", method);
        }
    }
}

/// The venue drops the connection unless a heartbeat test_request gets a
/// `public/test` call back
fn answer_test_request(shared: Arc<Shared>) {
    tokio::spawn(async move {
        log::trace!("Responding to heartbeat test_request");
        let result = match serde_json::to_value(Test::default()) {
            Ok(params) => shared.call(Test::METHOD, params).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            log::warn!("Heartbeat response failed: {}", e);
        }
    });
}
