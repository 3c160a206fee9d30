use super::VoteEventError;
use crate::vote_store::{VoteEventKind, VoteType};
use serde::{Deserialize, Serialize};

/// A vote change pushed from the upstream database, in the usual
/// replication envelope: `record` carries the new row, `old_record`
/// the previous one where applicable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteChangeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub table: String,
    #[serde(default)]
    pub record: Option<VoteRecord>,
    #[serde(default)]
    pub old_record: Option<VoteRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub id: String,
    pub voter_id: String,
    pub setlist_song_id: String,
    pub vote_type: VoteType,
    pub created_at: i64,
}

/// What a validated event asks the counters to do.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteMutation {
    pub kind: VoteEventKind,
    pub setlist_song_id: String,
    pub voter_id: String,
    pub up_delta: i64,
    pub down_delta: i64,
    /// The vote row to mirror, None for deletes.
    pub vote: Option<VoteRecord>,
    /// Vote id to remove from the mirror, for deletes.
    pub deleted_vote_id: Option<String>,
}

fn deltas_for(vote_type: VoteType, sign: i64) -> (i64, i64) {
    match vote_type {
        VoteType::Up => (sign, 0),
        VoteType::Down => (0, sign),
    }
}

/// Validate an incoming event and derive its counter deltas.
///
/// Returns `Ok(None)` for an update that does not change the vote
/// direction, which is a processed no-op. Anything structurally wrong
/// fails closed as `Malformed`.
pub fn validate_event(event: &VoteChangeEvent) -> Result<Option<VoteMutation>, VoteEventError> {
    if event.table != "votes" {
        return Err(VoteEventError::Malformed(format!(
            "unexpected table '{}'",
            event.table
        )));
    }

    match event.event_type.as_str() {
        "INSERT" => {
            let record = event
                .record
                .as_ref()
                .ok_or_else(|| VoteEventError::Malformed("INSERT without record".to_string()))?;
            let (up, down) = deltas_for(record.vote_type, 1);
            Ok(Some(VoteMutation {
                kind: VoteEventKind::Insert,
                setlist_song_id: record.setlist_song_id.clone(),
                voter_id: record.voter_id.clone(),
                up_delta: up,
                down_delta: down,
                vote: Some(record.clone()),
                deleted_vote_id: None,
            }))
        }
        "UPDATE" => {
            let record = event
                .record
                .as_ref()
                .ok_or_else(|| VoteEventError::Malformed("UPDATE without record".to_string()))?;
            let old = event.old_record.as_ref().ok_or_else(|| {
                VoteEventError::Malformed("UPDATE without old_record".to_string())
            })?;
            if old.setlist_song_id != record.setlist_song_id {
                return Err(VoteEventError::Malformed(
                    "UPDATE moved vote to a different song".to_string(),
                ));
            }
            if old.vote_type == record.vote_type {
                return Ok(None);
            }
            // Vote flipped direction: one column down, the other up,
            // applied as a single paired mutation.
            let (old_up, old_down) = deltas_for(old.vote_type, -1);
            let (new_up, new_down) = deltas_for(record.vote_type, 1);
            Ok(Some(VoteMutation {
                kind: VoteEventKind::Update,
                setlist_song_id: record.setlist_song_id.clone(),
                voter_id: record.voter_id.clone(),
                up_delta: old_up + new_up,
                down_delta: old_down + new_down,
                vote: Some(record.clone()),
                deleted_vote_id: None,
            }))
        }
        "DELETE" => {
            let old = event.old_record.as_ref().ok_or_else(|| {
                VoteEventError::Malformed("DELETE without old_record".to_string())
            })?;
            let (up, down) = deltas_for(old.vote_type, -1);
            Ok(Some(VoteMutation {
                kind: VoteEventKind::Delete,
                setlist_song_id: old.setlist_song_id.clone(),
                voter_id: old.voter_id.clone(),
                up_delta: up,
                down_delta: down,
                vote: None,
                deleted_vote_id: Some(old.id.clone()),
            }))
        }
        other => Err(VoteEventError::Malformed(format!(
            "unknown event type '{}'",
            other
        ))),
    }
}
