//! Client Module
//!
//! The public face of the crate. Owns the connection lifecycle and composes
//! the RPC transport, authentication gate, subscription bookkeeping and event
//! dispatcher.

use crate::auth::{AuthGate, AuthTokens};
use crate::config::Config;
use crate::dispatcher::{EventDispatcher, Listener};
use crate::error::{ClientError, ClientResult};
use crate::protocol::{
    Event, Notification, PrivateSubscribe, PrivateUnsubscribe, PublicSubscribe, PublicUnsubscribe,
    Request, SetHeartbeat,
};
use crate::rpc::{NotificationHandler, RpcConnection, RpcOptions};
use crate::stats::{LatencyStats, LatencyTracker};
use crate::subscription::{SubscriptionManager, SubscriptionPlan};
use crate::transport;

use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Client state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Persistent JSON-RPC client for one venue.
///
/// Cheap to clone; clones share the connection and all state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    shutdown: CancellationToken,
    state: watch::Sender<ConnectionState>,
    rpc: RwLock<Option<Arc<RpcConnection>>>,
    /// Serialises `start()` so only one dial loop runs at a time
    connecting: tokio::sync::Mutex<()>,
    auth: AuthGate,
    /// Credentials of the last successful login, replayed on auto-reconnect
    credentials: Mutex<Option<(String, String)>>,
    subscriptions: tokio::sync::Mutex<SubscriptionManager>,
    dispatcher: Arc<EventDispatcher>,
    latency: Arc<Mutex<LatencyTracker>>,
}

impl Client {
    /// Create a client; nothing is dialled until [`Client::start`]
    pub fn new(config: Config) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a client whose whole lifecycle is bound to `shutdown`.
    ///
    /// Cancelling the token fails in-flight calls with
    /// [`ClientError::Cancelled`] and closes the connection.
    pub fn with_cancellation(config: Config, shutdown: CancellationToken) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                shutdown,
                state,
                rpc: RwLock::new(None),
                connecting: tokio::sync::Mutex::new(()),
                auth: AuthGate::new(),
                credentials: Mutex::new(None),
                subscriptions: tokio::sync::Mutex::new(SubscriptionManager::new()),
                dispatcher: Arc::new(EventDispatcher::new()),
                latency: Arc::new(Mutex::new(LatencyTracker::new())),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Connect, retrying up to `connect_attempts` times with a fixed delay.
    ///
    /// Returns [`ClientError::ConnectFailed`] once the budget is exhausted.
    /// A no-op when already connected.
    pub async fn start(&self) -> ClientResult<()> {
        self.inner.start().await
    }

    /// Issue a raw call. `private/` methods need a prior [`Client::authenticate`].
    pub async fn call(&self, method: &str, params: Value) -> ClientResult<Value> {
        self.inner.call(method, params).await
    }

    /// Issue a typed call
    pub async fn request<R: Request>(&self, request: &R) -> ClientResult<R::Response> {
        self.inner.request(request).await
    }

    /// Log in with the configured API key and secret
    pub async fn authenticate(&self) -> ClientResult<AuthTokens> {
        let (api_key, secret_key) = (
            self.inner.config.api_key.clone(),
            self.inner.config.secret_key.clone(),
        );
        self.inner.authenticate(&api_key, &secret_key).await
    }

    /// Log in with explicit credentials
    pub async fn authenticate_with(
        &self,
        api_key: &str,
        secret_key: &str,
    ) -> ClientResult<AuthTokens> {
        self.inner.authenticate(api_key, secret_key).await
    }

    /// Trade the held refresh token for a new token pair
    pub async fn refresh_token(&self) -> ClientResult<AuthTokens> {
        let rpc = self.inner.connection()?;
        self.inner.auth.refresh(&rpc).await
    }

    /// Forget the held token pair; gated calls fail until the next login
    pub fn logout(&self) {
        self.inner.auth.clear();
        *self
            .inner
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.auth.is_authenticated()
    }

    pub fn auth_tokens(&self) -> Option<AuthTokens> {
        self.inner.auth.tokens()
    }

    /// Subscribe to `channels`, skipping those already active.
    ///
    /// Public and `user.` channels go out in at most one batched call each.
    /// A batch that fails stays inactive and is retried by the next call.
    pub async fn subscribe<I, S>(&self, channels: I) -> ClientResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: Vec<String> = channels.into_iter().map(Into::into).collect();
        let mut subs = self.inner.subscriptions.lock().await;
        let plan = subs.request(&channels);
        self.inner.send_subscribe(&mut subs, plan).await
    }

    /// Re-send every requested channel the venue has not confirmed on the
    /// current connection
    pub async fn resubscribe(&self) -> ClientResult<()> {
        self.inner.resubscribe().await
    }

    /// Unsubscribe from `channels` and drop them from the wish-list.
    ///
    /// Channels of a batch the venue rejects stay subscribed and requested.
    pub async fn unsubscribe<I, S>(&self, channels: I) -> ClientResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: Vec<String> = channels.into_iter().map(Into::into).collect();
        let mut subs = self.inner.subscriptions.lock().await;

        // Never confirmed by the venue, so nothing to tell it
        let idle: Vec<String> = channels
            .iter()
            .filter(|c| !subs.is_active(c))
            .cloned()
            .collect();
        subs.remove(&idle);

        let plan = subs.active_plan(&channels);
        if !plan.public.is_empty() {
            log::info!("Unsubscribing from public channels: {:?}", plan.public);
            self.request(&PublicUnsubscribe::new(plan.public.clone())).await?;
            subs.remove(&plan.public);
        }
        if !plan.private.is_empty() {
            log::info!("Unsubscribing from private channels: {:?}", plan.private);
            self.request(&PrivateUnsubscribe::new(plan.private.clone())).await?;
            subs.remove(&plan.private);
        }
        Ok(())
    }

    /// Distinct channels requested so far, in first-request order
    pub async fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions.lock().await.requested()
    }

    pub async fn is_subscribed(&self, channel: &str) -> bool {
        self.inner.subscriptions.lock().await.is_active(channel)
    }

    /// Deliver every event of `channel` to `listener`
    pub fn register_listener<L: Listener>(&self, channel: &str, listener: L) {
        self.inner.dispatcher.register_listener(channel, listener);
    }

    /// Receive every event of `channel` on a queue
    pub fn listen(&self, channel: &str) -> mpsc::UnboundedReceiver<Arc<Event>> {
        self.inner.dispatcher.listen(channel)
    }

    /// Stop delivering `channel` events to every listener and queue
    pub fn remove_listeners(&self, channel: &str) {
        self.inner.dispatcher.remove_listeners(channel);
    }

    /// Ask the venue to send heartbeats every `interval` seconds
    pub async fn set_heartbeat(&self, interval: u64) -> ClientResult<()> {
        self.inner.set_heartbeat(interval).await
    }

    /// Token cancelled when the current connection goes away.
    ///
    /// Already cancelled when there is no connection.
    pub fn disconnect_notify(&self) -> CancellationToken {
        match self.inner.connection() {
            Ok(rpc) => rpc.disconnect_notify(),
            Err(_) => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn latency_stats(&self) -> LatencyStats {
        self.inner
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_stats()
    }

    /// Log call latency percentiles and start a new interval
    pub fn log_latency_stats(&self) {
        self.inner
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .log_and_reset();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Shut the client down for good
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        let rpc = self
            .inner
            .rpc
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(rpc) = rpc {
            rpc.close();
        }
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }
}

/// Routes notifications from the RPC transport into the dispatcher
struct DispatchHook {
    dispatcher: Arc<EventDispatcher>,
}

impl NotificationHandler for DispatchHook {
    fn on_notification(&self, notification: Notification) {
        match notification {
            Notification::Subscription(event) => self.dispatcher.on_notification(event),
            Notification::Heartbeat(kind) => log::trace!("Heartbeat: {:?}", kind),
        }
    }
}

impl Inner {
    fn connection(&self) -> ClientResult<Arc<RpcConnection>> {
        self.rpc
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|rpc| rpc.is_connected())
            .cloned()
            .ok_or(ClientError::NotConnected)
    }

    async fn start(self: &Arc<Self>) -> ClientResult<()> {
        let _guard = self.connecting.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if self.connection().is_ok() {
            return Ok(());
        }

        let url = self.config.addr.as_str();
        let attempts = self.config.connect_attempts;
        self.state.send_replace(ConnectionState::Connecting);

        let mut stream = None;
        for attempt in 1..=attempts {
            log::info!("Connecting to {} (attempt {}/{})", url, attempt, attempts);
            let dialled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Err(ClientError::Cancelled),
                result = transport::dial(url, self.config.dial_timeout) => result,
            };
            match dialled {
                Ok(conn) => {
                    stream = Some(conn);
                    break;
                }
                Err(ClientError::Cancelled) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Err(ClientError::Cancelled);
                }
                Err(e) => log::warn!("Connect attempt {} failed: {}", attempt, e),
            }
            if attempt < attempts {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        self.state.send_replace(ConnectionState::Disconnected);
                        return Err(ClientError::Cancelled);
                    }
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                }
            }
        }

        let Some(stream) = stream else {
            self.state.send_replace(ConnectionState::Disconnected);
            log::error!("Giving up on {} after {} attempts", url, attempts);
            return Err(ClientError::ConnectFailed { attempts });
        };

        let rpc = Arc::new(RpcConnection::new(
            stream,
            Arc::new(DispatchHook {
                dispatcher: self.dispatcher.clone(),
            }),
            self.shutdown.clone(),
            self.latency.clone(),
            RpcOptions {
                request_timeout: self.config.request_timeout,
                debug: self.config.debug_mode,
            },
        ));
        tokio::spawn(supervise(
            Arc::downgrade(self),
            Arc::downgrade(&rpc),
            rpc.disconnect_notify(),
        ));
        *self.rpc.write().unwrap_or_else(PoisonError::into_inner) = Some(rpc);
        self.state.send_replace(ConnectionState::Connected);
        log::info!("Connected to {}", url);

        if let Some(interval) = self.config.heartbeat_interval {
            if let Err(e) = self.set_heartbeat(interval).await {
                log::warn!("Failed to enable heartbeat: {}", e);
            }
        }
        Ok(())
    }

    async fn call(&self, method: &str, params: Value) -> ClientResult<Value> {
        // Gate first so a rejected call never reaches the wire
        let params = self.auth.guard(method, params)?;
        let rpc = self.connection()?;
        rpc.call(method, params).await
    }

    async fn request<R: Request>(&self, request: &R) -> ClientResult<R::Response> {
        let params = serde_json::to_value(request)?;
        let result = self.call(R::METHOD, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn authenticate(&self, api_key: &str, secret_key: &str) -> ClientResult<AuthTokens> {
        let rpc = self.connection()?;
        let tokens = self.auth.authenticate(&rpc, api_key, secret_key).await?;
        *self.credentials.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((api_key.to_string(), secret_key.to_string()));
        Ok(tokens)
    }

    async fn set_heartbeat(&self, interval: u64) -> ClientResult<()> {
        let answer = self.request(&SetHeartbeat { interval }).await?;
        log::debug!("Heartbeat every {}s: {}", interval, answer);
        Ok(())
    }

    async fn resubscribe(&self) -> ClientResult<()> {
        let mut subs = self.subscriptions.lock().await;
        let plan = subs.pending();
        self.send_subscribe(&mut subs, plan).await
    }

    async fn send_subscribe(
        &self,
        subs: &mut SubscriptionManager,
        plan: SubscriptionPlan,
    ) -> ClientResult<()> {
        if plan.is_empty() {
            log::debug!("All requested channels already subscribed");
            return Ok(());
        }

        if !plan.public.is_empty() {
            log::info!("Subscribing to public channels: {:?}", plan.public);
            self.request(&PublicSubscribe::new(plan.public.clone())).await?;
            subs.mark_active(&plan.public);
        }
        if !plan.private.is_empty() {
            log::info!("Subscribing to private channels: {:?}", plan.private);
            self.request(&PrivateSubscribe::new(plan.private.clone())).await?;
            subs.mark_active(&plan.private);
        }
        Ok(())
    }

    /// Tear down state tied to the lost connection; the venue forgets the
    /// token and subscriptions with it
    async fn handle_disconnect(self: &Arc<Self>, lost: &Weak<RpcConnection>) {
        {
            let mut current = self.rpc.write().unwrap_or_else(PoisonError::into_inner);
            let is_current = current
                .as_ref()
                .is_some_and(|rpc| Weak::ptr_eq(&Arc::downgrade(rpc), lost));
            // Closed by the caller or already replaced
            if !is_current {
                return;
            }
            *current = None;
        }

        self.auth.clear();
        self.subscriptions.lock().await.reset_active();
        self.state.send_replace(ConnectionState::Disconnected);
        log::warn!("Disconnected from {}", self.config.addr);

        if self.config.auto_reconnect && !self.shutdown.is_cancelled() {
            self.reconnect().await;
        }
    }

    async fn reconnect(self: &Arc<Self>) {
        log::info!("Reconnecting to {}", self.config.addr);
        if let Err(e) = self.start().await {
            log::error!("Reconnect failed: {}", e);
            return;
        }

        let credentials = self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some((api_key, secret_key)) = credentials {
            if let Err(e) = self.authenticate(&api_key, &secret_key).await {
                log::error!("Re-authentication failed: {}", e);
                return;
            }
        }

        if let Err(e) = self.resubscribe().await {
            log::error!("Resubscribe after reconnect failed: {}", e);
        }
    }
}

/// Wait for `rpc` to disconnect, then run the disconnect handling.
///
/// Boxed so the recursion through `start` has a nameable type.
fn supervise(
    inner: Weak<Inner>,
    rpc: Weak<RpcConnection>,
    disconnected: CancellationToken,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        disconnected.cancelled().await;
        if let Some(inner) = inner.upgrade() {
            inner.handle_disconnect(&rpc).await;
        }
    })
}
