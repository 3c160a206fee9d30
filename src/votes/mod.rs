mod anomaly;
mod events;
mod handler;
mod scoring;
mod velocity;

pub use anomaly::{AnomalyDetector, AnomalyFinding, AnomalyInput, AnomalyKind};
pub use events::{validate_event, VoteChangeEvent, VoteMutation, VoteRecord};
pub use handler::{VoteEventHandler, VoteEventOutcome};
pub use scoring::{batch_artist_score, batch_show_score, incremental_song_score, positive_ratio};
pub use velocity::VelocityTracker;

use crate::vote_store::CounterError;
use thiserror::Error;

/// Failures while processing a vote change event.
///
/// Only `Malformed`, `UnknownSong` and `Counter` abort an event; side
/// channels such as alerts and broadcast degrade without surfacing
/// here.
#[derive(Debug, Error)]
pub enum VoteEventError {
    #[error("malformed vote event: {0}")]
    Malformed(String),
    #[error("unknown setlist song {0}")]
    UnknownSong(String),
    #[error(transparent)]
    Counter(#[from] CounterError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
