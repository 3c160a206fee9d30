use super::models::{SetlistSongTally, Vote, VoteEventKind, VoteType};
use super::{CounterError, VoteStore};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS votes (
    id TEXT PRIMARY KEY,
    voter_id TEXT NOT NULL,
    setlist_song_id TEXT NOT NULL,
    vote_type TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE(voter_id, setlist_song_id)
);

CREATE TABLE IF NOT EXISTS setlist_song_tallies (
    setlist_song_id TEXT PRIMARY KEY,
    upvotes INTEGER NOT NULL DEFAULT 0,
    downvotes INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS vote_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    setlist_song_id TEXT NOT NULL,
    voter_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vote_events_song ON vote_events(setlist_song_id, created_at);
CREATE INDEX IF NOT EXISTS idx_vote_events_voter ON vote_events(voter_id, setlist_song_id, created_at);
";

pub struct SqliteVoteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVoteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open votes database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        if is_new_db {
            info!("Creating new votes database at {:?}", path);
        }
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize votes schema")?;
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_tally(row: &rusqlite::Row) -> rusqlite::Result<SetlistSongTally> {
        Ok(SetlistSongTally {
            setlist_song_id: row.get("setlist_song_id")?,
            upvotes: row.get("upvotes")?,
            downvotes: row.get("downvotes")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl VoteStore for SqliteVoteStore {
    fn ensure_tally(&self, setlist_song_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO setlist_song_tallies (setlist_song_id, upvotes, downvotes, updated_at)
             VALUES (?1, 0, 0, ?2)",
            params![setlist_song_id, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn apply_tally_delta(
        &self,
        setlist_song_id: &str,
        up_delta: i64,
        down_delta: i64,
    ) -> Result<SetlistSongTally, CounterError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().timestamp();

        // Single statement: both columns move together or not at all.
        let mut stmt = conn.prepare(
            "UPDATE setlist_song_tallies
             SET upvotes = upvotes + ?2, downvotes = downvotes + ?3, updated_at = ?4
             WHERE setlist_song_id = ?1
             RETURNING setlist_song_id, upvotes, downvotes, updated_at",
        )?;

        let tally = stmt
            .query_row(
                params![setlist_song_id, up_delta, down_delta, now],
                Self::row_to_tally,
            )
            .optional()?;

        tally.ok_or_else(|| CounterError::MissingEntity(setlist_song_id.to_string()))
    }

    fn get_tally(&self, setlist_song_id: &str) -> Result<Option<SetlistSongTally>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT setlist_song_id, upvotes, downvotes, updated_at
             FROM setlist_song_tallies WHERE setlist_song_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![setlist_song_id], Self::row_to_tally)
            .optional()?)
    }

    fn upsert_vote(&self, vote: &Vote) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO votes (id, voter_id, setlist_song_id, vote_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET vote_type = ?4, created_at = ?5",
            params![
                vote.id,
                vote.voter_id,
                vote.setlist_song_id,
                vote.vote_type.as_str(),
                vote.created_at
            ],
        )?;
        Ok(())
    }

    fn delete_vote(&self, vote_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM votes WHERE id = ?1", params![vote_id])?;
        Ok(())
    }

    fn record_vote_event(
        &self,
        setlist_song_id: &str,
        voter_id: &str,
        kind: VoteEventKind,
        at: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO vote_events (setlist_song_id, voter_id, event_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![setlist_song_id, voter_id, kind.as_str(), at],
        )?;
        Ok(())
    }

    fn count_song_events(&self, setlist_song_id: &str, since: i64, until: i64) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vote_events
             WHERE setlist_song_id = ?1 AND event_type = 'insert'
               AND created_at > ?2 AND created_at <= ?3",
            params![setlist_song_id, since, until],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_voter_events(
        &self,
        voter_id: &str,
        setlist_song_id: &str,
        since: i64,
        until: i64,
    ) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vote_events
             WHERE voter_id = ?1 AND setlist_song_id = ?2
               AND created_at > ?3 AND created_at <= ?4",
            params![voter_id, setlist_song_id, since, until],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct TestStore {
        store: SqliteVoteStore,
        _temp_dir: TempDir,
    }

    fn create_test_store() -> TestStore {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("votes.db");
        let store = SqliteVoteStore::new(&db_path).unwrap();
        TestStore {
            store,
            _temp_dir: temp_dir,
        }
    }

    #[test]
    fn test_ensure_tally_is_idempotent() {
        let test = create_test_store();
        let store = &test.store;

        store.ensure_tally("song-1").unwrap();
        let tally = store.apply_tally_delta("song-1", 1, 0).unwrap();
        assert_eq!(tally.upvotes, 1);

        // A second ensure must not reset the counters
        store.ensure_tally("song-1").unwrap();
        let tally = store.get_tally("song-1").unwrap().unwrap();
        assert_eq!(tally.upvotes, 1);
        assert_eq!(tally.downvotes, 0);
    }

    #[test]
    fn test_apply_tally_delta_missing_entity() {
        let test = create_test_store();
        let store = &test.store;

        let err = store.apply_tally_delta("unknown-song", 1, 0).unwrap_err();
        assert!(matches!(err, CounterError::MissingEntity(id) if id == "unknown-song"));
    }

    #[test]
    fn test_apply_tally_delta_accumulates() {
        let test = create_test_store();
        let store = &test.store;

        store.ensure_tally("song-1").unwrap();
        store.apply_tally_delta("song-1", 1, 0).unwrap();
        store.apply_tally_delta("song-1", 1, 0).unwrap();
        let tally = store.apply_tally_delta("song-1", 0, 1).unwrap();

        assert_eq!(tally.upvotes, 2);
        assert_eq!(tally.downvotes, 1);
        assert_eq!(tally.total_votes(), 3);
    }

    #[test]
    fn test_vote_type_change_is_one_mutation() {
        let test = create_test_store();
        let store = &test.store;

        store.ensure_tally("song-1").unwrap();
        store.apply_tally_delta("song-1", 1, 0).unwrap();

        // up -> down: paired compensating deltas in a single statement
        let tally = store.apply_tally_delta("song-1", -1, 1).unwrap();
        assert_eq!(tally.upvotes, 0);
        assert_eq!(tally.downvotes, 1);
        assert_eq!(tally.total_votes(), 1);
    }

    #[test]
    fn test_vote_mirror_upsert_and_delete() {
        let test = create_test_store();
        let store = &test.store;

        let mut vote = Vote {
            id: "vote-1".to_string(),
            voter_id: "voter-1".to_string(),
            setlist_song_id: "song-1".to_string(),
            vote_type: VoteType::Up,
            created_at: 100,
        };
        store.upsert_vote(&vote).unwrap();

        // Same vote id changes direction
        vote.vote_type = VoteType::Down;
        vote.created_at = 200;
        store.upsert_vote(&vote).unwrap();

        store.delete_vote("vote-1").unwrap();
        // Deleting again is a no-op
        store.delete_vote("vote-1").unwrap();
    }

    #[test]
    fn test_event_counts_use_half_open_window() {
        let test = create_test_store();
        let store = &test.store;

        for at in [100, 150, 200] {
            store
                .record_vote_event("song-1", "voter-1", VoteEventKind::Insert, at)
                .unwrap();
        }
        store
            .record_vote_event("song-2", "voter-2", VoteEventKind::Insert, 150)
            .unwrap();

        // (100, 200]: the event at exactly `since` is excluded, `until` included
        assert_eq!(store.count_song_events("song-1", 100, 200).unwrap(), 2);
        assert_eq!(store.count_song_events("song-1", 99, 200).unwrap(), 3);
        assert_eq!(store.count_song_events("song-1", 0, 99).unwrap(), 0);

        assert_eq!(store.count_voter_events("voter-1", "song-1", 0, 300).unwrap(), 3);
        assert_eq!(store.count_voter_events("voter-2", "song-2", 0, 300).unwrap(), 1);
        assert_eq!(store.count_voter_events("voter-3", "song-1", 0, 300).unwrap(), 0);
    }

    #[test]
    fn test_song_event_count_ignores_flips_and_deletes() {
        let test = create_test_store();
        let store = &test.store;

        store
            .record_vote_event("song-1", "voter-1", VoteEventKind::Insert, 100)
            .unwrap();
        store
            .record_vote_event("song-1", "voter-1", VoteEventKind::Update, 110)
            .unwrap();
        store
            .record_vote_event("song-1", "voter-1", VoteEventKind::Delete, 120)
            .unwrap();
        store
            .record_vote_event("song-1", "voter-2", VoteEventKind::Insert, 130)
            .unwrap();

        // Only the two vote creations feed the song's velocity
        assert_eq!(store.count_song_events("song-1", 0, 300).unwrap(), 2);
    }

    #[test]
    fn test_voter_event_count_is_per_song() {
        let test = create_test_store();
        let store = &test.store;

        for i in 0..4 {
            store
                .record_vote_event(&format!("song-{}", i), "voter-1", VoteEventKind::Insert, 100)
                .unwrap();
        }
        store
            .record_vote_event("song-0", "voter-1", VoteEventKind::Insert, 110)
            .unwrap();

        // Four songs, but at most two events on any single one
        assert_eq!(store.count_voter_events("voter-1", "song-0", 0, 300).unwrap(), 2);
        assert_eq!(store.count_voter_events("voter-1", "song-1", 0, 300).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_tally_deltas_are_all_applied() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(
            SqliteVoteStore::new(temp_dir.path().join("votes.db")).unwrap(),
        );
        store.ensure_tally("song-1").unwrap();

        let threads: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.apply_tally_delta("song-1", 1, 0).unwrap();
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        let tally = store.get_tally("song-1").unwrap().unwrap();
        assert_eq!(tally.upvotes, 32);
        assert_eq!(tally.downvotes, 0);
    }
}
