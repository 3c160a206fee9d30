//! WebSocket connection manager.
//!
//! Tracks active connections and the show topics each one follows.
//! Vote updates fan out to every connection subscribed to the show.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use super::messages::{msg_types, ServerMessage};
use crate::broadcast::{VoteBroadcaster, VoteUpdateMessage};
use crate::server::metrics;

struct ConnectionEntry {
    sender: mpsc::Sender<ServerMessage>,
    topics: HashSet<String>,
}

/// Manages all active WebSocket connections and their topic
/// subscriptions. Connections are keyed by a process-local id.
pub struct TopicConnectionManager {
    connections: RwLock<HashMap<usize, ConnectionEntry>>,
    next_id: AtomicUsize,
}

impl Default for TopicConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the connection id and a receiver for outgoing messages.
    /// The caller forwards messages from the receiver to the socket.
    pub async fn register(&self) -> (usize, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(32);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut conns = self.connections.write().await;
        conns.insert(
            id,
            ConnectionEntry {
                sender: tx,
                topics: HashSet::new(),
            },
        );

        (id, rx)
    }

    /// Unregister a connection, dropping all its subscriptions.
    pub async fn unregister(&self, connection_id: usize) {
        let mut conns = self.connections.write().await;
        conns.remove(&connection_id);
    }

    /// Subscribe a connection to a show topic. Returns false for
    /// unknown connections.
    pub async fn subscribe(&self, connection_id: usize, show_id: &str) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get_mut(&connection_id) {
            Some(entry) => {
                entry.topics.insert(show_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Unsubscribe a connection from a show topic. Removing a topic the
    /// connection never followed is a no-op.
    pub async fn unsubscribe(&self, connection_id: usize, show_id: &str) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get_mut(&connection_id) {
            Some(entry) => {
                entry.topics.remove(show_id);
                true
            }
            None => false,
        }
    }

    /// Send a message to every connection following a show.
    ///
    /// Returns the count of failed sends; a slow or gone client never
    /// blocks the others.
    pub async fn publish_to_topic(&self, show_id: &str, message: ServerMessage) -> usize {
        let conns = self.connections.read().await;
        let mut sent = 0;
        let mut failed = 0;

        for entry in conns.values() {
            if !entry.topics.contains(show_id) {
                continue;
            }
            if entry.sender.try_send(message.clone()).is_ok() {
                sent += 1;
            } else {
                failed += 1;
            }
        }

        metrics::record_broadcast(sent, failed);
        failed
    }

    /// Send a message to one connection. Returns false when the
    /// connection is gone or its channel is full.
    pub async fn send_to(&self, connection_id: usize, message: ServerMessage) -> bool {
        let conns = self.connections.read().await;
        match conns.get(&connection_id) {
            Some(entry) => entry.sender.send(message).await.is_ok(),
            None => false,
        }
    }

    pub async fn subscriber_count(&self, show_id: &str) -> usize {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|entry| entry.topics.contains(show_id))
            .count()
    }

    pub async fn total_connections(&self) -> usize {
        let conns = self.connections.read().await;
        conns.len()
    }
}

#[async_trait]
impl VoteBroadcaster for TopicConnectionManager {
    async fn publish(&self, show_id: &str, message: VoteUpdateMessage) -> anyhow::Result<usize> {
        let envelope = ServerMessage::new(msg_types::VOTE_UPDATE, &message);
        Ok(self.publish_to_topic(show_id, envelope).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_creates_valid_receiver() {
        let manager = TopicConnectionManager::new();
        let (id, mut rx) = manager.register().await;
        manager.subscribe(id, "show-1").await;

        let failed = manager
            .publish_to_topic("show-1", ServerMessage::empty("test"))
            .await;
        assert_eq!(failed, 0);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.msg_type, "test");
    }

    #[tokio::test]
    async fn publish_reaches_only_subscribers() {
        let manager = TopicConnectionManager::new();
        let (id1, mut rx1) = manager.register().await;
        let (_id2, mut rx2) = manager.register().await;
        manager.subscribe(id1, "show-1").await;

        manager
            .publish_to_topic("show-1", ServerMessage::empty("vote_update"))
            .await;

        assert_eq!(rx1.recv().await.unwrap().msg_type, "vote_update");
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let manager = TopicConnectionManager::new();
        let (id, mut rx) = manager.register().await;
        manager.subscribe(id, "show-1").await;
        manager.unsubscribe(id, "show-1").await;

        manager
            .publish_to_topic("show-1", ServerMessage::empty("vote_update"))
            .await;
        assert!(rx.try_recv().is_err());

        // Unsubscribing again is harmless
        assert!(manager.unsubscribe(id, "show-1").await);
    }

    #[tokio::test]
    async fn publish_counts_failed_sends() {
        let manager = TopicConnectionManager::new();
        let (id1, rx1) = manager.register().await;
        let (id2, mut rx2) = manager.register().await;
        manager.subscribe(id1, "show-1").await;
        manager.subscribe(id2, "show-1").await;

        // Dropped receiver simulates a dead client
        drop(rx1);

        let failed = manager
            .publish_to_topic("show-1", ServerMessage::empty("vote_update"))
            .await;
        assert_eq!(failed, 1);
        assert_eq!(rx2.recv().await.unwrap().msg_type, "vote_update");
    }

    #[tokio::test]
    async fn unregister_removes_connection_and_topics() {
        let manager = TopicConnectionManager::new();
        let (id, _rx) = manager.register().await;
        manager.subscribe(id, "show-1").await;

        assert_eq!(manager.subscriber_count("show-1").await, 1);
        manager.unregister(id).await;
        assert_eq!(manager.subscriber_count("show-1").await, 0);
        assert_eq!(manager.total_connections().await, 0);

        // Operations on a gone connection report failure
        assert!(!manager.subscribe(id, "show-1").await);
    }

    #[tokio::test]
    async fn broadcaster_trait_wraps_payload_in_envelope() {
        let manager = TopicConnectionManager::new();
        let (id, mut rx) = manager.register().await;
        manager.subscribe(id, "show-1").await;

        let message = VoteUpdateMessage {
            show_id: "show-1".to_string(),
            setlist_song_id: "song-1".to_string(),
            upvotes: 3,
            downvotes: 1,
            total_votes: 4,
            positive_ratio: 0.75,
            velocity: 1.2,
            score: 2.5,
            timestamp: 1_700_000_000,
        };
        let failed = manager.publish("show-1", message).await.unwrap();
        assert_eq!(failed, 0);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.msg_type, msg_types::VOTE_UPDATE);
        assert_eq!(received.payload["setlist_song_id"], "song-1");
        assert_eq!(received.payload["total_votes"], 4);
        assert_eq!(received.payload["velocity"], 1.2);
        assert_eq!(received.payload["timestamp"], 1_700_000_000);
    }
}
