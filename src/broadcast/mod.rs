use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payload pushed to clients subscribed to a show topic after a vote
/// lands on one of its songs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteUpdateMessage {
    pub show_id: String,
    pub setlist_song_id: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub total_votes: i64,
    pub positive_ratio: f64,
    /// Votes per minute at the time of the update.
    pub velocity: f64,
    pub score: f64,
    /// Unix timestamp of the tally the message reflects.
    pub timestamp: i64,
}

/// Fan-out seam between vote processing and the transport.
///
/// `publish` returns the number of subscribers that could not be
/// reached; senders treat any outcome as best-effort.
#[async_trait]
pub trait VoteBroadcaster: Send + Sync {
    async fn publish(&self, show_id: &str, message: VoteUpdateMessage) -> anyhow::Result<usize>;
}

/// Broadcaster that drops everything. Useful when running without a
/// websocket surface and in store-level tests.
pub struct NullBroadcaster;

#[async_trait]
impl VoteBroadcaster for NullBroadcaster {
    async fn publish(&self, _show_id: &str, _message: VoteUpdateMessage) -> anyhow::Result<usize> {
        Ok(0)
    }
}
