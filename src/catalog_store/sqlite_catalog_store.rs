use super::models::{Artist, Setlist, SetlistSong, Show, SongContext};
use super::CatalogStore;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS artists (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    followers INTEGER NOT NULL DEFAULT 0,
    is_followed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS shows (
    id TEXT PRIMARY KEY,
    artist_id TEXT NOT NULL REFERENCES artists(id),
    venue TEXT NOT NULL,
    city TEXT,
    starts_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shows_starts_at ON shows(starts_at);
CREATE INDEX IF NOT EXISTS idx_shows_artist ON shows(artist_id);

CREATE TABLE IF NOT EXISTS setlists (
    id TEXT PRIMARY KEY,
    show_id TEXT NOT NULL REFERENCES shows(id)
);
CREATE INDEX IF NOT EXISTS idx_setlists_show ON setlists(show_id);

CREATE TABLE IF NOT EXISTS setlist_songs (
    id TEXT PRIMARY KEY,
    setlist_id TEXT NOT NULL REFERENCES setlists(id),
    title TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_setlist_songs_setlist ON setlist_songs(setlist_id);
";

pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open catalog database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        if is_new_db {
            info!("Creating new catalog database at {:?}", path);
        }
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize catalog schema")?;
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_artist(row: &rusqlite::Row) -> rusqlite::Result<Artist> {
        let is_followed: i64 = row.get("is_followed")?;
        Ok(Artist {
            id: row.get("id")?,
            name: row.get("name")?,
            followers: row.get("followers")?,
            is_followed: is_followed != 0,
        })
    }

    fn row_to_show(row: &rusqlite::Row) -> rusqlite::Result<Show> {
        Ok(Show {
            id: row.get("id")?,
            artist_id: row.get("artist_id")?,
            venue: row.get("venue")?,
            city: row.get("city")?,
            starts_at: row.get("starts_at")?,
        })
    }

    fn count_table(&self, table: &str) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap_or(0) as usize
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn get_artist(&self, id: &str) -> Result<Option<Artist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, followers, is_followed FROM artists WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::row_to_artist).optional()?)
    }

    fn get_show(&self, id: &str) -> Result<Option<Show>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, artist_id, venue, city, starts_at FROM shows WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], Self::row_to_show).optional()?)
    }

    fn get_setlist_song(&self, id: &str) -> Result<Option<SetlistSong>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, setlist_id, title, position FROM setlist_songs WHERE id = ?1")?;
        let song = stmt
            .query_row(params![id], |row| {
                Ok(SetlistSong {
                    id: row.get("id")?,
                    setlist_id: row.get("setlist_id")?,
                    title: row.get("title")?,
                    position: row.get("position")?,
                })
            })
            .optional()?;
        Ok(song)
    }

    fn resolve_song_context(&self, song_id: &str) -> Result<Option<SongContext>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT sl.id AS setlist_id, sh.id AS show_id, sh.artist_id AS artist_id
             FROM setlist_songs ss
             JOIN setlists sl ON sl.id = ss.setlist_id
             JOIN shows sh ON sh.id = sl.show_id
             WHERE ss.id = ?1",
        )?;
        let ctx = stmt
            .query_row(params![song_id], |row| {
                Ok(SongContext {
                    setlist_id: row.get("setlist_id")?,
                    show_id: row.get("show_id")?,
                    artist_id: row.get("artist_id")?,
                })
            })
            .optional()?;
        Ok(ctx)
    }

    fn get_upcoming_shows(&self, now: i64, horizon_days: i64) -> Result<Vec<Show>> {
        let conn = self.conn.lock().unwrap();
        let horizon_end = now + horizon_days * 86_400;
        let mut stmt = conn.prepare(
            "SELECT id, artist_id, venue, city, starts_at FROM shows
             WHERE starts_at > ?1 AND starts_at <= ?2
             ORDER BY starts_at ASC",
        )?;
        let shows = stmt
            .query_map(params![now, horizon_end], Self::row_to_show)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(shows)
    }

    fn get_followed_artists(&self) -> Result<Vec<Artist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, followers, is_followed FROM artists
             WHERE is_followed = 1 ORDER BY name ASC",
        )?;
        let artists = stmt
            .query_map([], Self::row_to_artist)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    fn count_upcoming_shows_for_artist(&self, artist_id: &str, now: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM shows WHERE artist_id = ?1 AND starts_at > ?2",
            params![artist_id, now],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn get_show_song_ids(&self, show_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT ss.id FROM setlist_songs ss
             JOIN setlists sl ON sl.id = ss.setlist_id
             WHERE sl.show_id = ?1
             ORDER BY ss.position ASC",
        )?;
        let ids = stmt
            .query_map(params![show_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn get_artists_count(&self) -> usize {
        self.count_table("artists")
    }

    fn get_shows_count(&self) -> usize {
        self.count_table("shows")
    }

    fn get_setlist_songs_count(&self) -> usize {
        self.count_table("setlist_songs")
    }

    fn insert_artist(&self, artist: &Artist) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artists (id, name, followers, is_followed) VALUES (?1, ?2, ?3, ?4)",
            params![
                artist.id,
                artist.name,
                artist.followers,
                artist.is_followed as i64
            ],
        )?;
        Ok(())
    }

    fn insert_show(&self, show: &Show) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO shows (id, artist_id, venue, city, starts_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![show.id, show.artist_id, show.venue, show.city, show.starts_at],
        )?;
        Ok(())
    }

    fn insert_setlist(&self, setlist: &Setlist) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO setlists (id, show_id) VALUES (?1, ?2)",
            params![setlist.id, setlist.show_id],
        )?;
        Ok(())
    }

    fn insert_setlist_song(&self, song: &SetlistSong) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO setlist_songs (id, setlist_id, title, position) VALUES (?1, ?2, ?3, ?4)",
            params![song.id, song.setlist_id, song.title, song.position],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct TestStore {
        store: SqliteCatalogStore,
        _temp_dir: TempDir,
    }

    fn create_test_store() -> TestStore {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("catalog.db");
        let store = SqliteCatalogStore::new(&db_path).unwrap();
        TestStore {
            store,
            _temp_dir: temp_dir,
        }
    }

    fn seed_show(store: &SqliteCatalogStore, artist_id: &str, show_id: &str, starts_at: i64) {
        store
            .insert_show(&Show {
                id: show_id.to_string(),
                artist_id: artist_id.to_string(),
                venue: "The Garden".to_string(),
                city: Some("Boston".to_string()),
                starts_at,
            })
            .unwrap();
    }

    #[test]
    fn test_artist_roundtrip() {
        let test = create_test_store();
        let store = &test.store;

        let artist = Artist {
            id: "artist-1".to_string(),
            name: "The National".to_string(),
            followers: 12000,
            is_followed: true,
        };
        store.insert_artist(&artist).unwrap();

        let loaded = store.get_artist("artist-1").unwrap().unwrap();
        assert_eq!(loaded, artist);

        assert!(store.get_artist("nope").unwrap().is_none());
    }

    #[test]
    fn test_resolve_song_context() {
        let test = create_test_store();
        let store = &test.store;

        store
            .insert_artist(&Artist {
                id: "artist-1".to_string(),
                name: "Band".to_string(),
                followers: 0,
                is_followed: false,
            })
            .unwrap();
        seed_show(store, "artist-1", "show-1", 1000);
        store
            .insert_setlist(&Setlist {
                id: "setlist-1".to_string(),
                show_id: "show-1".to_string(),
            })
            .unwrap();
        store
            .insert_setlist_song(&SetlistSong {
                id: "song-1".to_string(),
                setlist_id: "setlist-1".to_string(),
                title: "Opener".to_string(),
                position: 1,
            })
            .unwrap();

        let ctx = store.resolve_song_context("song-1").unwrap().unwrap();
        assert_eq!(ctx.setlist_id, "setlist-1");
        assert_eq!(ctx.show_id, "show-1");
        assert_eq!(ctx.artist_id, "artist-1");

        assert!(store.resolve_song_context("missing").unwrap().is_none());
    }

    #[test]
    fn test_upcoming_shows_window_is_half_open() {
        let test = create_test_store();
        let store = &test.store;

        store
            .insert_artist(&Artist {
                id: "artist-1".to_string(),
                name: "Band".to_string(),
                followers: 0,
                is_followed: false,
            })
            .unwrap();

        let now = 1_000_000;
        seed_show(store, "artist-1", "show-past", now - 10);
        seed_show(store, "artist-1", "show-now", now); // starts_at == now is excluded
        seed_show(store, "artist-1", "show-soon", now + 86_400);
        seed_show(store, "artist-1", "show-edge", now + 7 * 86_400); // inclusive end
        seed_show(store, "artist-1", "show-far", now + 8 * 86_400);

        let shows = store.get_upcoming_shows(now, 7).unwrap();
        let ids: Vec<_> = shows.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["show-soon", "show-edge"]);
    }

    #[test]
    fn test_followed_artists_and_upcoming_count() {
        let test = create_test_store();
        let store = &test.store;

        store
            .insert_artist(&Artist {
                id: "a1".to_string(),
                name: "Followed".to_string(),
                followers: 100,
                is_followed: true,
            })
            .unwrap();
        store
            .insert_artist(&Artist {
                id: "a2".to_string(),
                name: "Ignored".to_string(),
                followers: 500,
                is_followed: false,
            })
            .unwrap();

        let followed = store.get_followed_artists().unwrap();
        assert_eq!(followed.len(), 1);
        assert_eq!(followed[0].id, "a1");

        seed_show(store, "a1", "s1", 2000);
        seed_show(store, "a1", "s2", 3000);
        seed_show(store, "a1", "s-past", 500);

        assert_eq!(store.count_upcoming_shows_for_artist("a1", 1000).unwrap(), 2);
        assert_eq!(store.count_upcoming_shows_for_artist("a2", 1000).unwrap(), 0);
    }

    #[test]
    fn test_show_song_ids_ordered_by_position() {
        let test = create_test_store();
        let store = &test.store;

        store
            .insert_artist(&Artist {
                id: "a1".to_string(),
                name: "Band".to_string(),
                followers: 0,
                is_followed: false,
            })
            .unwrap();
        seed_show(store, "a1", "show-1", 1000);
        store
            .insert_setlist(&Setlist {
                id: "sl-1".to_string(),
                show_id: "show-1".to_string(),
            })
            .unwrap();

        for (id, pos) in [("song-b", 2), ("song-a", 1), ("song-c", 3)] {
            store
                .insert_setlist_song(&SetlistSong {
                    id: id.to_string(),
                    setlist_id: "sl-1".to_string(),
                    title: id.to_string(),
                    position: pos,
                })
                .unwrap();
        }

        let ids = store.get_show_song_ids("show-1").unwrap();
        assert_eq!(ids, vec!["song-a", "song-b", "song-c"]);
        assert!(store.get_show_song_ids("other").unwrap().is_empty());
    }

    #[test]
    fn test_counts() {
        let test = create_test_store();
        let store = &test.store;

        assert_eq!(store.get_artists_count(), 0);
        store
            .insert_artist(&Artist {
                id: "a1".to_string(),
                name: "Band".to_string(),
                followers: 0,
                is_followed: false,
            })
            .unwrap();
        assert_eq!(store.get_artists_count(), 1);
        assert_eq!(store.get_shows_count(), 0);
        assert_eq!(store.get_setlist_songs_count(), 0);
    }
}
