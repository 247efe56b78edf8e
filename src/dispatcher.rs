//! Event Dispatcher Module
//!
//! Fans subscription notifications out to per-channel listeners.
//!
//! Every listener owns an unbounded queue drained by its own task, so a slow
//! or panicking listener never holds up the reader or any other listener,
//! while each listener still sees a channel's events in arrival order.

use crate::protocol::Event;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

/// Consumer of events for one channel
pub trait Listener: Send + Sync + 'static {
    fn handle(&self, event: &Event);
}

impl<F> Listener for F
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}

type ListenerMap = HashMap<String, Vec<mpsc::UnboundedSender<Arc<Event>>>>;

#[derive(Debug, Default)]
pub struct EventDispatcher {
    listeners: RwLock<ListenerMap>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `channel`.
    ///
    /// Spawns the listener's delivery task, so it must be called from within
    /// a Tokio runtime.
    pub fn register_listener<L: Listener>(&self, channel: &str, listener: L) {
        let mut rx = self.listen(channel);
        let channel = channel.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                listener.handle(&event);
            }
            log::debug!("Listener for {} stopped", channel);
        });
    }

    /// Register a queue for `channel` and return its receiving end.
    ///
    /// Dropping the receiver unregisters it on the next event.
    pub fn listen(&self, channel: &str) -> mpsc::UnboundedReceiver<Arc<Event>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver `event` to every listener of its channel in registration order
    pub fn on_notification(&self, event: Event) {
        let event = Arc::new(event);
        let mut dead = false;

        {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            let Some(queues) = listeners.get(&event.channel) else {
                log::trace!("No listener for channel {}", event.channel);
                return;
            };
            for queue in queues {
                dead |= queue.send(event.clone()).is_err();
            }
        }

        if dead {
            self.prune(&event.channel);
        }
    }

    fn prune(&self, channel: &str) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(queues) = listeners.get_mut(channel) {
            let before = queues.len();
            queues.retain(|q| !q.is_closed());
            log::warn!(
                "Dropped {} stopped listener(s) for channel {}",
                before - queues.len(),
                channel
            );
            if queues.is_empty() {
                listeners.remove(channel);
            }
        }
    }

    /// Remove every listener of `channel`
    pub fn remove_listeners(&self, channel: &str) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel);
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, Vec::len)
    }
}
