mod models;
mod null_store;
mod sqlite_catalog_store;

pub use models::{Artist, Setlist, SetlistSong, Show, SongContext};
pub use null_store::NullCatalogStore;
pub use sqlite_catalog_store::SqliteCatalogStore;

use anyhow::Result;

/// Read-mostly reference data the vote pipeline depends on.
///
/// Lookups return `None` for unknown ids; `Err` is reserved for storage
/// failures. Insert operations exist for seeding and tests; catalogue
/// import from third parties lives outside this crate.
pub trait CatalogStore: Send + Sync {
    fn get_artist(&self, id: &str) -> Result<Option<Artist>>;
    fn get_show(&self, id: &str) -> Result<Option<Show>>;
    fn get_setlist_song(&self, id: &str) -> Result<Option<SetlistSong>>;

    /// Resolve a setlist song up to its show and artist.
    fn resolve_song_context(&self, song_id: &str) -> Result<Option<SongContext>>;

    /// Shows starting within `(now, now + horizon_days]`.
    fn get_upcoming_shows(&self, now: i64, horizon_days: i64) -> Result<Vec<Show>>;

    fn get_followed_artists(&self) -> Result<Vec<Artist>>;

    fn count_upcoming_shows_for_artist(&self, artist_id: &str, now: i64) -> Result<i64>;

    /// All setlist song ids attached to a show, across its setlists.
    fn get_show_song_ids(&self, show_id: &str) -> Result<Vec<String>>;

    fn get_artists_count(&self) -> usize;
    fn get_shows_count(&self) -> usize;
    fn get_setlist_songs_count(&self) -> usize;

    // Seeding operations.
    fn insert_artist(&self, artist: &Artist) -> Result<()>;
    fn insert_show(&self, show: &Show) -> Result<()>;
    fn insert_setlist(&self, setlist: &Setlist) -> Result<()>;
    fn insert_setlist_song(&self, song: &SetlistSong) -> Result<()>;
}
