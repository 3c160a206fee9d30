use crate::config::AnomalySettings;
use crate::vote_store::SetlistSongTally;
use serde_json::json;

/// The three advisory checks run after every counter mutation. Each
/// rule is independent; one event can trigger several.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    HighVoteVelocity,
    HighNegativeRatio,
    SuspiciousVotingPattern,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::HighVoteVelocity => "high_vote_velocity",
            AnomalyKind::HighNegativeRatio => "high_negative_ratio",
            AnomalyKind::SuspiciousVotingPattern => "suspicious_voting_pattern",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyFinding {
    pub kind: AnomalyKind,
    /// One human-readable line for the alert feed.
    pub message: String,
    pub details: serde_json::Value,
}

/// Everything the rules look at, gathered by the caller so detection
/// itself stays pure and trivially testable.
#[derive(Debug, Clone)]
pub struct AnomalyInput<'a> {
    pub tally: &'a SetlistSongTally,
    pub voter_id: &'a str,
    /// Song velocity over the anomaly window, in votes per minute.
    pub velocity_per_minute: f64,
    /// Events from this voter on this song within the burst window.
    pub voter_events_in_window: u64,
}

pub struct AnomalyDetector {
    settings: AnomalySettings,
}

impl AnomalyDetector {
    pub fn new(settings: AnomalySettings) -> Self {
        Self { settings }
    }

    pub fn evaluate(&self, input: &AnomalyInput) -> Vec<AnomalyFinding> {
        let mut findings = Vec::new();
        let song_id = &input.tally.setlist_song_id;

        if input.velocity_per_minute > self.settings.velocity_threshold_per_min {
            findings.push(AnomalyFinding {
                kind: AnomalyKind::HighVoteVelocity,
                message: format!(
                    "Song {} is receiving {:.1} votes per minute",
                    song_id, input.velocity_per_minute
                ),
                details: json!({
                    "votes_per_minute": input.velocity_per_minute,
                    "threshold": self.settings.velocity_threshold_per_min,
                    "window_secs": self.settings.velocity_window_secs,
                }),
            });
        }

        let total = input.tally.total_votes();
        if total > self.settings.negative_ratio_min_votes {
            let ratio = input.tally.downvotes as f64 / total as f64;
            if ratio > self.settings.negative_ratio_threshold {
                findings.push(AnomalyFinding {
                    kind: AnomalyKind::HighNegativeRatio,
                    message: format!(
                        "Song {} downvote ratio is {:.2} across {} votes",
                        song_id, ratio, total
                    ),
                    details: json!({
                        "downvote_ratio": ratio,
                        "threshold": self.settings.negative_ratio_threshold,
                        "total_votes": total,
                    }),
                });
            }
        }

        if input.voter_events_in_window > self.settings.voter_burst_threshold {
            findings.push(AnomalyFinding {
                kind: AnomalyKind::SuspiciousVotingPattern,
                message: format!(
                    "Voter {} produced {} vote events on song {} within {}s",
                    input.voter_id,
                    input.voter_events_in_window,
                    song_id,
                    self.settings.voter_burst_window_secs
                ),
                details: json!({
                    "events_in_window": input.voter_events_in_window,
                    "threshold": self.settings.voter_burst_threshold,
                    "window_secs": self.settings.voter_burst_window_secs,
                }),
            });
        }

        findings
    }
}
