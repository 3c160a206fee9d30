use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of entity a trending snapshot scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendingEntityType {
    Song,
    Show,
    Artist,
}

impl TrendingEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendingEntityType::Song => "song",
            TrendingEntityType::Show => "show",
            TrendingEntityType::Artist => "artist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "song" => Some(TrendingEntityType::Song),
            "show" => Some(TrendingEntityType::Show),
            "artist" => Some(TrendingEntityType::Artist),
            _ => None,
        }
    }
}

/// A scored entity at a point in time. One row per (entity, type); newer
/// computations replace older ones, never the other way around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendingSnapshot {
    pub entity_id: String,
    pub entity_type: TrendingEntityType,
    pub score: f64,
    /// Votes per minute at computation time. Zero for entities with no
    /// velocity component, like artists.
    pub velocity: f64,
    pub total_votes: i64,
    /// Upvote share at computation time; 0.5 where no votes exist.
    pub positive_ratio: f64,
    /// Unix timestamp of the computation that produced this score.
    pub computed_at: i64,
}

/// An advisory anomaly finding persisted for later inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub kind: String,
    pub setlist_song_id: String,
    pub show_id: String,
    pub voter_id: Option<String>,
    /// One human-readable line describing what tripped the rule.
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Running => "running",
            JobRunStatus::Completed => "completed",
            JobRunStatus::Failed => "failed",
            JobRunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobRunStatus::Running),
            "completed" => Some(JobRunStatus::Completed),
            "failed" => Some(JobRunStatus::Failed),
            "cancelled" => Some(JobRunStatus::Cancelled),
            _ => None,
        }
    }
}

/// A single execution of a background job.
#[derive(Debug, Clone)]
pub struct JobRun {
    pub id: String,
    pub job_id: String,
    pub status: JobRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Persisted schedule bookkeeping for an interval job.
#[derive(Debug, Clone)]
pub struct JobScheduleState {
    pub job_id: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// A structured audit entry emitted by a job while it runs.
#[derive(Debug, Clone)]
pub struct JobAuditEntry {
    pub id: i64,
    pub job_id: String,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
