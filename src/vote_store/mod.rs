mod models;
mod sqlite_vote_store;

pub use models::{SetlistSongTally, Vote, VoteEventKind, VoteType};
pub use sqlite_vote_store::SqliteVoteStore;

use anyhow::Result;
use thiserror::Error;

/// Failure applying a counter mutation. These are fatal for the event
/// being processed: a vote that cannot reach the counters is lost.
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("no tally row for setlist song {0}")]
    MissingEntity(String),
    #[error("tally storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Vote counters plus the vote mirror and the append-only event log
/// that powers burst detection.
pub trait VoteStore: Send + Sync {
    /// Provision the zero-count tally row for a song. Idempotent; called
    /// when a setlist song is created or seeded.
    fn ensure_tally(&self, setlist_song_id: &str) -> Result<()>;

    /// Apply signed deltas to a song's counters in a single statement.
    ///
    /// A vote type change passes paired compensating deltas and commits
    /// atomically; readers never observe the intermediate state. Zero
    /// rows updated means the tally row is missing, which is
    /// `CounterError::MissingEntity`.
    fn apply_tally_delta(
        &self,
        setlist_song_id: &str,
        up_delta: i64,
        down_delta: i64,
    ) -> Result<SetlistSongTally, CounterError>;

    fn get_tally(&self, setlist_song_id: &str) -> Result<Option<SetlistSongTally>>;

    fn upsert_vote(&self, vote: &Vote) -> Result<()>;
    fn delete_vote(&self, vote_id: &str) -> Result<()>;

    /// Append a row to the vote event audit log.
    fn record_vote_event(
        &self,
        setlist_song_id: &str,
        voter_id: &str,
        kind: VoteEventKind,
        at: i64,
    ) -> Result<()>;

    /// Vote-creating insert events for a song in the half-open window
    /// `(since, until]`. Flips and deletes do not count towards the
    /// song's velocity.
    fn count_song_events(&self, setlist_song_id: &str, since: i64, until: i64) -> Result<u64>;

    /// Events from a voter on one song in the half-open window
    /// `(since, until]`. Burst detection is per song; a voter spreading
    /// votes over many songs is ordinary behavior.
    fn count_voter_events(
        &self,
        voter_id: &str,
        setlist_song_id: &str,
        since: i64,
        until: i64,
    ) -> Result<u64>;
}
