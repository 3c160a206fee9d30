//! End-to-end pipeline tests: vote events through the handler, the
//! batch recompute job, and the trending order the stores end up with.

use async_trait::async_trait;
use chrono::Utc;
use encore_server::background_jobs::jobs::TrendingRecomputeJob;
use encore_server::background_jobs::{BackgroundJob, JobContext};
use encore_server::broadcast::{VoteBroadcaster, VoteUpdateMessage};
use encore_server::catalog_store::{Artist, CatalogStore, Setlist, SetlistSong, Show, SqliteCatalogStore};
use encore_server::config::{
    AnomalySettings, BroadcastSettings, ScoringSettings, TrendingJobSettings,
};
use encore_server::server_store::{ServerStore, SqliteServerStore, TrendingEntityType};
use encore_server::vote_store::{SqliteVoteStore, VoteStore, VoteType};
use encore_server::votes::{VoteChangeEvent, VoteEventHandler, VoteRecord};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct RecordingBroadcaster {
    published: Mutex<Vec<(String, VoteUpdateMessage)>>,
}

#[async_trait]
impl VoteBroadcaster for RecordingBroadcaster {
    async fn publish(&self, show_id: &str, message: VoteUpdateMessage) -> anyhow::Result<usize> {
        self.published
            .lock()
            .unwrap()
            .push((show_id.to_string(), message));
        Ok(0)
    }
}

struct Pipeline {
    catalog_store: Arc<SqliteCatalogStore>,
    vote_store: Arc<SqliteVoteStore>,
    server_store: Arc<SqliteServerStore>,
    handler: VoteEventHandler,
    broadcaster: Arc<RecordingBroadcaster>,
    _temp_dir: TempDir,
}

fn create_pipeline() -> Pipeline {
    let temp_dir = TempDir::new().unwrap();
    let catalog_store =
        Arc::new(SqliteCatalogStore::new(temp_dir.path().join("catalog.db")).unwrap());
    let vote_store = Arc::new(SqliteVoteStore::new(temp_dir.path().join("votes.db")).unwrap());
    let server_store =
        Arc::new(SqliteServerStore::new(temp_dir.path().join("server.db")).unwrap());
    let broadcaster = Arc::new(RecordingBroadcaster {
        published: Mutex::new(vec![]),
    });

    let handler = VoteEventHandler::new(
        catalog_store.clone(),
        vote_store.clone(),
        server_store.clone(),
        broadcaster.clone(),
        ScoringSettings::default(),
        AnomalySettings::default(),
        BroadcastSettings::default(),
    );

    Pipeline {
        catalog_store,
        vote_store,
        server_store,
        handler,
        broadcaster,
        _temp_dir: temp_dir,
    }
}

/// Seeds one artist with two shows, one song each. Returns now.
fn seed_catalog(pipeline: &Pipeline) -> i64 {
    let now = Utc::now().timestamp();

    pipeline
        .catalog_store
        .insert_artist(&Artist {
            id: "artist-1".to_string(),
            name: "The Headliners".to_string(),
            followers: 20_000,
            is_followed: true,
        })
        .unwrap();

    for (show_id, days_out) in [("show-near", 2), ("show-far", 45)] {
        pipeline
            .catalog_store
            .insert_show(&Show {
                id: show_id.to_string(),
                artist_id: "artist-1".to_string(),
                venue: format!("{} venue", show_id),
                city: Some("Berlin".to_string()),
                starts_at: now + days_out * 86_400,
            })
            .unwrap();
        let setlist_id = format!("setlist-{}", show_id);
        pipeline
            .catalog_store
            .insert_setlist(&Setlist {
                id: setlist_id.clone(),
                show_id: show_id.to_string(),
            })
            .unwrap();
        let song_id = format!("song-{}", show_id);
        pipeline
            .catalog_store
            .insert_setlist_song(&SetlistSong {
                id: song_id.clone(),
                setlist_id,
                title: "Closer".to_string(),
                position: 1,
            })
            .unwrap();
        pipeline.vote_store.ensure_tally(&song_id).unwrap();
    }

    now
}

fn insert_event(song_id: &str, voter_id: &str, vote_id: &str, vote_type: VoteType) -> VoteChangeEvent {
    VoteChangeEvent {
        event_type: "INSERT".to_string(),
        table: "votes".to_string(),
        record: Some(VoteRecord {
            id: vote_id.to_string(),
            voter_id: voter_id.to_string(),
            setlist_song_id: song_id.to_string(),
            vote_type,
            created_at: Utc::now().timestamp(),
        }),
        old_record: None,
    }
}

#[tokio::test]
async fn votes_flow_through_to_tallies_snapshots_and_broadcast() {
    let pipeline = create_pipeline();
    seed_catalog(&pipeline);

    for i in 0..4 {
        pipeline
            .handler
            .process(&insert_event(
                "song-show-near",
                &format!("voter-{}", i),
                &format!("vote-{}", i),
                if i == 3 { VoteType::Down } else { VoteType::Up },
            ))
            .await
            .unwrap();
    }

    let tally = pipeline
        .vote_store
        .get_tally("song-show-near")
        .unwrap()
        .unwrap();
    assert_eq!(tally.upvotes, 3);
    assert_eq!(tally.downvotes, 1);

    let snapshot = pipeline
        .server_store
        .get_trending_snapshot("song-show-near", TrendingEntityType::Song)
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.total_votes, 4);

    let published = pipeline.broadcaster.published.lock().unwrap();
    assert_eq!(published.len(), 4);
    assert!(published.iter().all(|(show_id, _)| show_id == "show-near"));
    let last = &published.last().unwrap().1;
    assert_eq!(last.total_votes, 4);
    assert_eq!(last.positive_ratio, 0.75);
    assert!(last.velocity > 0.0);
    assert!(last.timestamp > 0);
    assert_eq!(snapshot.positive_ratio, 0.75);
    assert!(snapshot.velocity > 0.0);
}

#[tokio::test]
async fn batch_job_ranks_near_show_above_far_show_with_equal_votes() {
    let pipeline = create_pipeline();
    seed_catalog(&pipeline);

    for song_id in ["song-show-near", "song-show-far"] {
        for i in 0..5 {
            pipeline
                .handler
                .process(&insert_event(
                    song_id,
                    &format!("{}-voter-{}", song_id, i),
                    &format!("{}-vote-{}", song_id, i),
                    VoteType::Up,
                ))
                .await
                .unwrap();
        }
    }

    let context = JobContext::new(
        pipeline.catalog_store.clone(),
        pipeline.vote_store.clone(),
        pipeline.server_store.clone(),
        CancellationToken::new(),
    );
    TrendingRecomputeJob::from_settings(TrendingJobSettings::default(), ScoringSettings::default())
        .execute(&context)
        .unwrap();

    let shows = pipeline
        .server_store
        .get_trending_snapshots(TrendingEntityType::Show, 10)
        .unwrap();
    assert_eq!(shows.len(), 2);
    assert_eq!(shows[0].entity_id, "show-near");
    assert_eq!(shows[1].entity_id, "show-far");
    assert_eq!(shows[0].total_votes, 5);
    assert!(shows[0].score > shows[1].score);
    assert_eq!(shows[0].positive_ratio, 1.0);
    assert!(shows[0].velocity > 0.0);

    let artists = pipeline
        .server_store
        .get_trending_snapshots(TrendingEntityType::Artist, 10)
        .unwrap();
    assert_eq!(artists.len(), 1);
    // 20000 followers + 2 upcoming shows * 1000
    assert_eq!(artists[0].score, 22_000.0);
}

#[tokio::test]
async fn batch_recompute_supersedes_incremental_song_snapshots_only_forward() {
    let pipeline = create_pipeline();
    seed_catalog(&pipeline);

    pipeline
        .handler
        .process(&insert_event("song-show-near", "voter-1", "vote-1", VoteType::Up))
        .await
        .unwrap();
    let first = pipeline
        .server_store
        .get_trending_snapshot("song-show-near", TrendingEntityType::Song)
        .unwrap()
        .unwrap();

    // A later vote refreshes the snapshot; computed_at never moves back
    pipeline
        .handler
        .process(&insert_event("song-show-near", "voter-2", "vote-2", VoteType::Up))
        .await
        .unwrap();
    let second = pipeline
        .server_store
        .get_trending_snapshot("song-show-near", TrendingEntityType::Song)
        .unwrap()
        .unwrap();
    assert!(second.computed_at >= first.computed_at);
    assert_eq!(second.total_votes, 2);
}

#[tokio::test]
async fn burst_voter_triggers_alert_visible_in_store() {
    let pipeline = create_pipeline();
    seed_catalog(&pipeline);

    for i in 0..11 {
        pipeline
            .handler
            .process(&insert_event(
                "song-show-near",
                "greedy-voter",
                &format!("vote-{}", i),
                VoteType::Up,
            ))
            .await
            .unwrap();
    }

    let alerts = pipeline.server_store.list_alerts(50, 0).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, "suspicious_voting_pattern");
    assert_eq!(alerts[0].setlist_song_id, "song-show-near");
    assert!(alerts[0].message.contains("greedy-voter"));
}
