use serde::{Deserialize, Serialize};

/// Direction of a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Up => "up",
            VoteType::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(VoteType::Up),
            "down" => Some(VoteType::Down),
            _ => None,
        }
    }
}

/// Mirror of an upstream vote row. One row per (voter, song).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: String,
    pub voter_id: String,
    pub setlist_song_id: String,
    pub vote_type: VoteType,
    /// Unix timestamp of the vote.
    pub created_at: i64,
}

/// Denormalized per-song counters. The authority for vote totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetlistSongTally {
    pub setlist_song_id: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub updated_at: i64,
}

impl SetlistSongTally {
    pub fn total_votes(&self) -> i64 {
        self.upvotes + self.downvotes
    }
}

/// What a vote mutation did, recorded in the append-only audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteEventKind {
    Insert,
    Update,
    Delete,
}

impl VoteEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteEventKind::Insert => "insert",
            VoteEventKind::Update => "update",
            VoteEventKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(VoteEventKind::Insert),
            "update" => Some(VoteEventKind::Update),
            "delete" => Some(VoteEventKind::Delete),
            _ => None,
        }
    }
}
