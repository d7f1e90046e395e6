//! Change-feed registry shared by the gateway implementations.
//!
//! One live feed per (collection, owner) pair. Re-subscribing for a pair
//! replaces the previous sender, so a channel is never delivered twice;
//! feeds whose receiver has been dropped are pruned on the next publish.

use aura_core::traits::{ChangeEvent, Collection, Subscription};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

type FeedKey = (Collection, Uuid);

#[derive(Default)]
pub(crate) struct FeedRegistry {
    feeds: Mutex<HashMap<FeedKey, mpsc::UnboundedSender<ChangeEvent>>>,
}

impl FeedRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Open a feed for `(collection, owner)`, tearing down any previous
    /// feed for the same key.
    pub(crate) fn subscribe(&self, collection: Collection, owner: Uuid) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .feeds
            .lock()
            .expect("feed registry poisoned")
            .insert((collection, owner), tx);
        if previous.is_some() {
            tracing::debug!(
                "feed: replaced existing subscription for {} / {owner}",
                collection.table_name()
            );
        }
        Subscription::new(rx)
    }

    /// Deliver a change to the feed for `(collection, owner)`, if any.
    pub(crate) fn publish(&self, collection: Collection, owner: Uuid, event: ChangeEvent) {
        let mut feeds = self.feeds.lock().expect("feed registry poisoned");
        if let Some(tx) = feeds.get(&(collection, owner)) {
            if tx.send(event).is_err() {
                // Receiver dropped; the subscriber unsubscribed.
                feeds.remove(&(collection, owner));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::traits::ChangeKind;

    fn event() -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Insert,
            row: serde_json::json!({"id": "1"}),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let registry = FeedRegistry::new();
        let owner = Uuid::new_v4();
        let mut sub = registry.subscribe(Collection::Tasks, owner);
        registry.publish(Collection::Tasks, owner, event());
        assert!(sub.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_resubscribe_closes_previous() {
        let registry = FeedRegistry::new();
        let owner = Uuid::new_v4();
        let mut first = registry.subscribe(Collection::Tasks, owner);
        let mut second = registry.subscribe(Collection::Tasks, owner);
        registry.publish(Collection::Tasks, owner, event());
        // Old feed is closed, new feed gets the event.
        assert!(first.recv().await.is_none());
        assert!(second.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_publish_scoped_by_owner() {
        let registry = FeedRegistry::new();
        let owner = Uuid::new_v4();
        let mut sub = registry.subscribe(Collection::Tasks, owner);
        registry.publish(Collection::Tasks, Uuid::new_v4(), event());
        assert!(sub.try_recv().is_none());
    }
}
