use serde::{Deserialize, Serialize};

/// An artist fans can follow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub followers: i64,
    /// True if the artist is followed on this deployment and should be
    /// picked up by the trending recompute.
    pub is_followed: bool,
}

/// A scheduled concert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Show {
    pub id: String,
    pub artist_id: String,
    pub venue: String,
    pub city: Option<String>,
    /// Unix timestamp of the show's start.
    pub starts_at: i64,
}

/// A predicted setlist for a show.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Setlist {
    pub id: String,
    pub show_id: String,
}

/// A song entry in a setlist, the entity votes attach to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetlistSong {
    pub id: String,
    pub setlist_id: String,
    pub title: String,
    pub position: i64,
}

/// Resolved ancestry of a setlist song, used to route broadcasts and
/// attribute alerts.
#[derive(Debug, Clone, PartialEq)]
pub struct SongContext {
    pub setlist_id: String,
    pub show_id: String,
    pub artist_id: String,
}
