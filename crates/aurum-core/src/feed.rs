use std::sync::Arc;

use aurum_types::{TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::model::Transaction;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Change notification pushed to realtime subscribers of a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub user_id: String,
    pub transaction_id: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub at: DateTime<Utc>,
}

impl From<&Transaction> for ChangeEvent {
    fn from(txn: &Transaction) -> Self {
        Self {
            user_id: txn.owner.clone(),
            transaction_id: txn.id.clone(),
            kind: txn.kind,
            status: txn.status,
            amount: txn.amount,
            at: txn.updated_at,
        }
    }
}

/// Publish/subscribe channel keyed by user id.
///
/// Channels are created on first subscription and dropped with the last one,
/// so publishing to a user nobody listens to is a no-op.
#[derive(Clone)]
pub struct ChangeFeed {
    channels: Arc<DashMap<String, broadcast::Sender<ChangeEvent>>>,
    capacity: usize,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.channels
            .get(&event.user_id)
            .and_then(|sender| sender.send(event).ok())
            .unwrap_or(0)
    }

    pub fn subscribe(&self, user_id: &str) -> Subscription {
        let receiver = self
            .channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        Subscription {
            user_id: user_id.to_string(),
            receiver,
            feed: self.clone(),
        }
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.channels
            .get(user_id)
            .map_or(0, |sender| sender.receiver_count())
    }

    fn release(&self, user_id: &str) {
        // the releasing subscription still holds its receiver at this point
        self.channels
            .remove_if(user_id, |_, sender| sender.receiver_count() <= 1);
    }
}

pub struct Subscription {
    user_id: String,
    receiver: broadcast::Receiver<ChangeEvent>,
    feed: ChangeFeed,
}

impl Subscription {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Waits for the next event. Returns `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        user = %self.user_id,
                        skipped,
                        "Change feed subscriber lagging, events dropped",
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.feed.release(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    fn event(user: &str) -> ChangeEvent {
        ChangeEvent {
            user_id: user.to_string(),
            transaction_id: "txn_1".to_string(),
            kind: TransactionKind::Deposit,
            status: TransactionStatus::Completed,
            amount: dec!(25),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_events_are_routed_by_user() {
        let feed = ChangeFeed::default();
        let mut alice = feed.subscribe("alice");
        let mut bob = feed.subscribe("bob");

        assert_eq!(feed.publish(event("alice")), 1);

        let received = alice.recv().await.unwrap();
        assert_eq!(received.user_id, "alice");
        assert!(bob.receiver.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let feed = ChangeFeed::default();
        assert_eq!(feed.publish(event("carol")), 0);
        assert_eq!(feed.subscriber_count("carol"), 0);
    }

    #[test]
    fn test_unsubscribe_releases_channel() {
        let feed = ChangeFeed::default();
        let first = feed.subscribe("alice");
        let second = feed.subscribe("alice");
        assert_eq!(feed.subscriber_count("alice"), 2);

        first.unsubscribe();
        assert_eq!(feed.subscriber_count("alice"), 1);

        drop(second);
        assert_eq!(feed.subscriber_count("alice"), 0);
        assert!(feed.channels.is_empty());
    }
}
