//! Subscription matching for SUB sockets.
//!
//! A message is delivered when its body starts with any subscribed prefix.
//! Subscriptions are reference counted so that subscribing twice requires
//! unsubscribing twice.

use bytes::Bytes;

/// A subscription entry with topic prefix
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Topic prefix (empty = subscribe to all)
    pub prefix: Bytes,
    refs: usize,
}

impl Subscription {
    /// Create a new subscription for a topic prefix
    #[must_use]
    pub const fn new(prefix: Bytes) -> Self {
        Self { prefix, refs: 1 }
    }

    /// Check if this subscription matches a given topic
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        topic.starts_with(&self.prefix)
    }
}

/// Subscription storage
#[derive(Debug, Default)]
pub struct SubscriptionTrie {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionTrie {
    /// Create a new empty subscription trie
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Add a subscription
    pub fn subscribe(&mut self, prefix: Bytes) {
        match self.subscriptions.iter_mut().find(|s| s.prefix == prefix) {
            Some(existing) => existing.refs += 1,
            None => self.subscriptions.push(Subscription::new(prefix)),
        }
    }

    /// Remove a subscription.
    ///
    /// Returns false if the prefix was not subscribed.
    pub fn unsubscribe(&mut self, prefix: &[u8]) -> bool {
        let Some(pos) = self.subscriptions.iter().position(|s| s.prefix == prefix) else {
            return false;
        };
        let entry = &mut self.subscriptions[pos];
        entry.refs -= 1;
        if entry.refs == 0 {
            self.subscriptions.swap_remove(pos);
        }
        true
    }

    /// Check if a topic matches any subscription
    ///
    /// No subscriptions means nothing is delivered.
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        self.subscriptions.iter().any(|s| s.matches(topic))
    }

    /// Get all subscriptions
    #[must_use]
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }
}
