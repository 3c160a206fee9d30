use crate::vote_store::VoteStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Computes vote velocity on demand from the persisted event log,
/// so every reader sees the same numbers without shared mutable state.
pub struct VelocityTracker {
    vote_store: Arc<dyn VoteStore>,
}

impl VelocityTracker {
    pub fn new(vote_store: Arc<dyn VoteStore>) -> Self {
        Self { vote_store }
    }

    /// Votes created per minute for a song over the window ending at
    /// `now`. Flips and retractions are not new votes and do not count.
    pub fn song_votes_per_minute(
        &self,
        setlist_song_id: &str,
        now: i64,
        window: Duration,
    ) -> Result<f64> {
        let since = now - window.as_secs() as i64;
        let count = self
            .vote_store
            .count_song_events(setlist_song_id, since, now)?;
        Ok(per_minute(count, window))
    }

    /// How many vote events a single voter produced on one song in the
    /// window ending at `now`.
    pub fn voter_events_in_window(
        &self,
        voter_id: &str,
        setlist_song_id: &str,
        now: i64,
        window: Duration,
    ) -> Result<u64> {
        let since = now - window.as_secs() as i64;
        self.vote_store
            .count_voter_events(voter_id, setlist_song_id, since, now)
    }
}

fn per_minute(count: u64, window: Duration) -> f64 {
    let minutes = window.as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    count as f64 / minutes
}
