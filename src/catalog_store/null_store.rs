use super::models::{Artist, Setlist, SetlistSong, Show, SongContext};
use super::CatalogStore;
use anyhow::Result;

/// A catalog store with no content. Used in tests that exercise code
/// paths which require a store but never touch reference data.
pub struct NullCatalogStore;

impl CatalogStore for NullCatalogStore {
    fn get_artist(&self, _id: &str) -> Result<Option<Artist>> {
        Ok(None)
    }

    fn get_show(&self, _id: &str) -> Result<Option<Show>> {
        Ok(None)
    }

    fn get_setlist_song(&self, _id: &str) -> Result<Option<SetlistSong>> {
        Ok(None)
    }

    fn resolve_song_context(&self, _song_id: &str) -> Result<Option<SongContext>> {
        Ok(None)
    }

    fn get_upcoming_shows(&self, _now: i64, _horizon_days: i64) -> Result<Vec<Show>> {
        Ok(vec![])
    }

    fn get_followed_artists(&self) -> Result<Vec<Artist>> {
        Ok(vec![])
    }

    fn count_upcoming_shows_for_artist(&self, _artist_id: &str, _now: i64) -> Result<i64> {
        Ok(0)
    }

    fn get_show_song_ids(&self, _show_id: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }

    fn get_artists_count(&self) -> usize {
        0
    }

    fn get_shows_count(&self) -> usize {
        0
    }

    fn get_setlist_songs_count(&self) -> usize {
        0
    }

    fn insert_artist(&self, _artist: &Artist) -> Result<()> {
        Ok(())
    }

    fn insert_show(&self, _show: &Show) -> Result<()> {
        Ok(())
    }

    fn insert_setlist(&self, _setlist: &Setlist) -> Result<()> {
        Ok(())
    }

    fn insert_setlist_song(&self, _song: &SetlistSong) -> Result<()> {
        Ok(())
    }
}
