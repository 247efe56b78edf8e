//! Subscription Module
//!
//! Bookkeeping for channel subscriptions: the ordered wish-list of every
//! channel the caller asked for, and the set of channels the venue has
//! confirmed on the current connection.

use crate::protocol::PRIVATE_CHANNEL_PREFIX;

use std::collections::HashSet;

/// Which subscribe method a channel goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    /// Classify a channel by its name
    pub fn of(channel: &str) -> Self {
        if channel.starts_with(PRIVATE_CHANNEL_PREFIX) {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}

/// Channels still to be sent, split by visibility
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPlan {
    pub public: Vec<String>,
    pub private: Vec<String>,
}

impl SubscriptionPlan {
    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.private.is_empty()
    }

    fn push(&mut self, channel: String) {
        match Visibility::of(&channel) {
            Visibility::Public => self.public.push(channel),
            Visibility::Private => self.private.push(channel),
        }
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Every requested channel in request order; may hold duplicates
    requested: Vec<String>,
    active: HashSet<String>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `channels` to the wish-list and return what is not yet active.
    ///
    /// The plan is recomputed over the whole wish-list, so channels from an
    /// earlier failed batch are retried. Each channel appears once, at the
    /// position of its first request.
    pub fn request(&mut self, channels: &[String]) -> SubscriptionPlan {
        self.requested.extend(channels.iter().cloned());
        self.pending()
    }

    /// Wish-list channels the venue has not confirmed yet
    pub fn pending(&self) -> SubscriptionPlan {
        let mut seen = HashSet::new();
        let mut plan = SubscriptionPlan::default();
        for channel in &self.requested {
            if self.active.contains(channel) || !seen.insert(channel.as_str()) {
                continue;
            }
            plan.push(channel.clone());
        }
        plan
    }

    /// Record channels the venue confirmed
    pub fn mark_active(&mut self, channels: &[String]) {
        self.active.extend(channels.iter().cloned());
    }

    /// Active channels among `channels`, split by visibility; these are the
    /// ones the venue must be told to stop sending
    pub fn active_plan(&self, channels: &[String]) -> SubscriptionPlan {
        let mut plan = SubscriptionPlan::default();
        let mut seen = HashSet::new();
        for channel in channels {
            if seen.insert(channel.as_str()) && self.active.contains(channel) {
                plan.push(channel.clone());
            }
        }
        plan
    }

    /// Drop `channels` from the wish-list and the active set
    pub fn remove(&mut self, channels: &[String]) {
        let removed: HashSet<&str> = channels.iter().map(String::as_str).collect();
        self.requested.retain(|c| !removed.contains(c.as_str()));
        self.active.retain(|c| !removed.contains(c.as_str()));
    }

    /// Forget what the venue confirmed; the wish-list is kept for replay
    pub fn reset_active(&mut self) {
        self.active.clear();
    }

    pub fn is_active(&self, channel: &str) -> bool {
        self.active.contains(channel)
    }

    /// Distinct requested channels in first-request order
    pub fn requested(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.requested
            .iter()
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
