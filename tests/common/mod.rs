//! Mock venue for integration tests.
//!
//! A local WebSocket server that can refuse the first N dials, records every
//! request frame it receives, and hands each accepted connection to the test
//! so it can answer, push notifications or drop the socket.

#![allow(dead_code)]

use deribit_ws_client::Config;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

pub struct MockVenue {
    pub url: String,
    accepts: Arc<AtomicUsize>,
    frames: Arc<Mutex<Vec<Value>>>,
    connections: mpsc::UnboundedReceiver<VenueConn>,
}

enum VenueCmd {
    Send(Value),
    Kill,
}

/// One accepted client connection
pub struct VenueConn {
    requests: Option<mpsc::UnboundedReceiver<Value>>,
    commands: mpsc::UnboundedSender<VenueCmd>,
}

impl MockVenue {
    /// Start a venue that drops the first `reject_first` TCP connections
    /// before the WebSocket handshake
    pub async fn start(reject_first: usize) -> MockVenue {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let frames = Arc::new(Mutex::new(Vec::new()));
        let (conn_tx, connections) = mpsc::unbounded_channel();

        let accepted = accepts.clone();
        let recorded = frames.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let n = accepted.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= reject_first {
                    drop(socket);
                    continue;
                }
                let Ok(ws) = accept_async(socket).await else {
                    continue;
                };

                let (req_tx, req_rx) = mpsc::unbounded_channel();
                let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                tokio::spawn(run_connection(ws, req_tx, cmd_rx, recorded.clone()));
                let conn = VenueConn {
                    requests: Some(req_rx),
                    commands: cmd_tx,
                };
                if conn_tx.send(conn).is_err() {
                    break;
                }
            }
        });

        MockVenue {
            url: format!("ws://{}", addr),
            accepts,
            frames,
            connections,
        }
    }

    /// Client config pointing at this venue with fast retries
    pub fn config(&self) -> Config {
        Config {
            addr: self.url.clone(),
            api_key: "key".to_string(),
            secret_key: "secret".to_string(),
            connect_attempts: 10,
            retry_delay: Duration::from_millis(10),
            dial_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// TCP connections accepted so far, including rejected ones
    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub async fn next_connection(&mut self) -> VenueConn {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("no connection arrived")
            .expect("venue stopped")
    }

    /// Whether another connection arrives within `within`
    pub async fn connection_within(&mut self, within: Duration) -> Option<VenueConn> {
        tokio::time::timeout(within, self.connections.recv())
            .await
            .ok()
            .flatten()
    }

    /// Every request frame received on any connection
    pub fn frames(&self) -> Vec<Value> {
        self.frames.lock().unwrap().clone()
    }

    /// Request frames for `method`
    pub fn frames_for(&self, method: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["method"] == method)
            .collect()
    }
}

impl VenueConn {
    pub async fn next_request(&mut self) -> Value {
        let requests = self.requests.as_mut().expect("requests are auto-answered");
        tokio::time::timeout(WAIT, requests.recv())
            .await
            .expect("no request arrived")
            .expect("connection closed")
    }

    pub fn reply(&self, request: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}));
    }

    pub fn reply_error(&self, request: &Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": code, "message": message}
        }));
    }

    pub fn push(&self, channel: &str, data: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": {"channel": channel, "data": data}
        }));
    }

    pub fn send(&self, frame: Value) {
        let _ = self.commands.send(VenueCmd::Send(frame));
    }

    /// Drop the socket without a close handshake
    pub fn kill(&self) {
        let _ = self.commands.send(VenueCmd::Kill);
    }

    /// Answer every further request with [`default_reply`]
    pub fn auto_reply(&mut self) {
        let mut requests = self.requests.take().expect("already auto-answering");
        let commands = self.commands.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let frame = default_reply(&request);
                if commands.send(VenueCmd::Send(frame)).is_err() {
                    break;
                }
            }
        });
    }
}

/// Canned venue answers
pub fn default_reply(request: &Value) -> Value {
    let id = request["id"].clone();
    let params = &request["params"];
    match request["method"].as_str().unwrap_or_default() {
        "public/auth" => {
            if params["client_secret"] == "bad" {
                return json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": 13004, "message": "invalid_credentials"}
                });
            }
            json!({"jsonrpc": "2.0", "id": id, "result": {
                "access_token": format!("token-{}", id),
                "refresh_token": "refresh",
                "expires_in": 900,
                "scope": "connection",
                "token_type": "bearer"
            }})
        }
        "public/subscribe" | "private/subscribe" | "public/unsubscribe" | "private/unsubscribe" => {
            json!({"jsonrpc": "2.0", "id": id, "result": params["channels"]})
        }
        "public/get_time" => json!({"jsonrpc": "2.0", "id": id, "result": 1_700_000_000_000u64}),
        _ => json!({"jsonrpc": "2.0", "id": id, "result": "ok"}),
    }
}

async fn run_connection(
    ws: WebSocketStream<TcpStream>,
    requests: mpsc::UnboundedSender<Value>,
    mut commands: mpsc::UnboundedReceiver<VenueCmd>,
    frames: Arc<Mutex<Vec<Value>>>,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let request: Value = serde_json::from_str(&text).unwrap();
                    frames.lock().unwrap().push(request.clone());
                    let _ = requests.send(request);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            cmd = commands.recv() => match cmd {
                Some(VenueCmd::Send(frame)) => {
                    if write.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(VenueCmd::Kill) | None => break,
            },
        }
    }
}

/// Poll `check` until it holds or the wait expires
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
