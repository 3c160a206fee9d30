use crate::background_jobs::context::JobContext;
use crate::background_jobs::job::{BackgroundJob, HookEvent, JobError, JobSchedule};
use crate::config::{ScoringSettings, TrendingJobSettings};
use crate::server::metrics;
use crate::server_store::{ServerStore, TrendingEntityType, TrendingSnapshot};
use crate::votes::{batch_artist_score, batch_show_score, positive_ratio, VelocityTracker};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub const TRENDING_RECOMPUTE_JOB_ID: &str = "trending_recompute";

const LEASE_NAME: &str = "trending_recompute";

/// Releases the recompute lease when the pass ends, including early
/// returns and panics inside the pass.
struct LeaseGuard {
    store: Arc<dyn ServerStore>,
    holder: String,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lease(LEASE_NAME, &self.holder) {
            warn!("Failed to release recompute lease: {:#}", e);
        }
    }
}

/// Periodic full recompute of show and artist trending scores.
///
/// A cluster-wide lease keeps concurrent instances from duplicating the
/// pass; losing the lease race is a skip, not a failure.
pub struct TrendingRecomputeJob {
    holder: String,
    settings: TrendingJobSettings,
    scoring: ScoringSettings,
}

impl TrendingRecomputeJob {
    pub fn from_settings(settings: TrendingJobSettings, scoring: ScoringSettings) -> Self {
        Self {
            holder: Uuid::new_v4().to_string(),
            settings,
            scoring,
        }
    }

    fn recompute_shows(&self, context: &JobContext, now: i64) -> Result<(usize, usize), JobError> {
        let shows = context
            .catalog_store
            .get_upcoming_shows(now, self.settings.show_lookahead_days)
            .map_err(|e| JobError::ExecutionFailed(format!("listing upcoming shows: {:#}", e)))?;

        let mut processed = 0;
        let mut failures = 0;
        for show in shows {
            if context.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            match self.score_show(context, &show.id, show.starts_at, now) {
                Ok(()) => processed += 1,
                Err(e) => {
                    warn!("Failed to score show {}: {:#}", show.id, e);
                    failures += 1;
                }
            }
        }
        Ok((processed, failures))
    }

    fn score_show(
        &self,
        context: &JobContext,
        show_id: &str,
        starts_at: i64,
        now: i64,
    ) -> anyhow::Result<()> {
        let song_ids = context.catalog_store.get_show_song_ids(show_id)?;
        let tracker = VelocityTracker::new(context.vote_store.clone());
        let mut upvotes = 0;
        let mut downvotes = 0;
        let mut velocity = 0.0;
        for song_id in &song_ids {
            if let Some(tally) = context.vote_store.get_tally(song_id)? {
                upvotes += tally.upvotes;
                downvotes += tally.downvotes;
            }
            velocity +=
                tracker.song_votes_per_minute(song_id, now, self.scoring.velocity_window())?;
        }
        let total_votes = upvotes + downvotes;

        let days_until = (starts_at - now + 86_399).div_euclid(86_400);
        let score = batch_show_score(total_votes, days_until);

        let written = context.server_store.upsert_trending_snapshot(&TrendingSnapshot {
            entity_id: show_id.to_string(),
            entity_type: TrendingEntityType::Show,
            score,
            velocity,
            total_votes,
            positive_ratio: positive_ratio(upvotes, downvotes),
            computed_at: now,
        })?;
        if written {
            metrics::record_snapshot_upsert(TrendingEntityType::Show.as_str());
        }
        Ok(())
    }

    fn recompute_artists(
        &self,
        context: &JobContext,
        now: i64,
    ) -> Result<(usize, usize), JobError> {
        let artists = context
            .catalog_store
            .get_followed_artists()
            .map_err(|e| JobError::ExecutionFailed(format!("listing followed artists: {:#}", e)))?;

        let mut processed = 0;
        let mut failures = 0;
        for artist in artists {
            if context.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            let result = context
                .catalog_store
                .count_upcoming_shows_for_artist(&artist.id, now)
                .and_then(|upcoming| {
                    let score = batch_artist_score(artist.followers, upcoming);
                    let written =
                        context.server_store.upsert_trending_snapshot(&TrendingSnapshot {
                            entity_id: artist.id.clone(),
                            entity_type: TrendingEntityType::Artist,
                            score,
                            velocity: 0.0,
                            total_votes: 0,
                            positive_ratio: 0.5,
                            computed_at: now,
                        })?;
                    if written {
                        metrics::record_snapshot_upsert(TrendingEntityType::Artist.as_str());
                    }
                    Ok(())
                });
            match result {
                Ok(()) => processed += 1,
                Err(e) => {
                    warn!("Failed to score artist {}: {:#}", artist.id, e);
                    failures += 1;
                }
            }
        }
        Ok((processed, failures))
    }
}

impl BackgroundJob for TrendingRecomputeJob {
    fn id(&self) -> &str {
        TRENDING_RECOMPUTE_JOB_ID
    }

    fn name(&self) -> &str {
        "Trending Recompute"
    }

    fn description(&self) -> &str {
        "Recomputes trending scores for upcoming shows and followed artists"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            interval: Duration::from_secs(self.settings.interval_minutes * 60),
            hooks: vec![HookEvent::OnStartup],
        }
    }

    fn execute(&self, context: &JobContext) -> Result<(), JobError> {
        let now = Utc::now().timestamp();

        let acquired = context
            .server_store
            .try_acquire_lease(LEASE_NAME, &self.holder, self.settings.lease_ttl_secs, now)
            .map_err(|e| JobError::ExecutionFailed(format!("acquiring lease: {:#}", e)))?;
        if !acquired {
            info!("Another instance holds the recompute lease, skipping pass");
            if let Err(e) = context.server_store.log_job_audit(
                self.id(),
                "skipped",
                &json!({"reason": "lease_held"}),
            ) {
                warn!("Failed to audit skipped pass: {:#}", e);
            }
            return Ok(());
        }
        let _guard = LeaseGuard {
            store: context.server_store.clone(),
            holder: self.holder.clone(),
        };

        let (shows_processed, show_failures) = self.recompute_shows(context, now)?;
        let (artists_processed, artist_failures) = self.recompute_artists(context, now)?;

        let details = json!({
            "shows_processed": shows_processed,
            "artists_processed": artists_processed,
            "failures": show_failures + artist_failures,
        });
        info!(
            "Trending recompute finished: {} shows, {} artists, {} failures",
            shows_processed,
            artists_processed,
            show_failures + artist_failures
        );
        if let Err(e) = context
            .server_store
            .log_job_audit(self.id(), "completed", &details)
        {
            warn!("Failed to audit recompute pass: {:#}", e);
        }

        Ok(())
    }
}
