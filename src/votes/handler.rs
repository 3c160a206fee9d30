use super::anomaly::{AnomalyDetector, AnomalyInput};
use super::events::{validate_event, VoteChangeEvent, VoteMutation};
use super::scoring::{incremental_song_score, positive_ratio};
use super::velocity::VelocityTracker;
use super::VoteEventError;
use crate::broadcast::{VoteBroadcaster, VoteUpdateMessage};
use crate::catalog_store::{CatalogStore, SongContext};
use crate::config::{AnomalySettings, BroadcastSettings, ScoringSettings};
use crate::server::metrics;
use crate::server_store::{Alert, ServerStore, TrendingEntityType, TrendingSnapshot};
use crate::vote_store::{SetlistSongTally, Vote, VoteStore};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// What processing an event produced, reported back to the sender.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoteEventOutcome {
    pub success: bool,
    /// False for events that were valid but changed nothing, like an
    /// update that kept the same vote direction.
    pub processed: bool,
    pub event_type: String,
    pub alerts_triggered: usize,
}

/// Drives a vote change event through the whole pipeline: counter
/// mutation, anomaly checks, the incremental trending score and the
/// websocket fan-out.
pub struct VoteEventHandler {
    catalog_store: Arc<dyn CatalogStore>,
    vote_store: Arc<dyn VoteStore>,
    server_store: Arc<dyn ServerStore>,
    broadcaster: Arc<dyn VoteBroadcaster>,
    velocity: VelocityTracker,
    detector: AnomalyDetector,
    scoring: ScoringSettings,
    anomaly: AnomalySettings,
    broadcast: BroadcastSettings,
}

impl VoteEventHandler {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        vote_store: Arc<dyn VoteStore>,
        server_store: Arc<dyn ServerStore>,
        broadcaster: Arc<dyn VoteBroadcaster>,
        scoring: ScoringSettings,
        anomaly: AnomalySettings,
        broadcast: BroadcastSettings,
    ) -> Self {
        Self {
            catalog_store,
            vote_store: vote_store.clone(),
            server_store,
            broadcaster,
            velocity: VelocityTracker::new(vote_store),
            detector: AnomalyDetector::new(anomaly.clone()),
            scoring,
            anomaly,
            broadcast,
        }
    }

    pub async fn process(
        &self,
        event: &VoteChangeEvent,
    ) -> Result<VoteEventOutcome, VoteEventError> {
        let started = Instant::now();
        let result = self.process_inner(event).await;
        let status = if result.is_ok() { "success" } else { "failure" };
        metrics::record_vote_event(&event.event_type, status, started.elapsed().as_secs_f64());
        result
    }

    async fn process_inner(
        &self,
        event: &VoteChangeEvent,
    ) -> Result<VoteEventOutcome, VoteEventError> {
        let Some(mutation) = validate_event(event)? else {
            debug!("Vote event changed nothing, skipping");
            return Ok(VoteEventOutcome {
                success: true,
                processed: false,
                event_type: event.event_type.clone(),
                alerts_triggered: 0,
            });
        };

        let context = self
            .catalog_store
            .resolve_song_context(&mutation.setlist_song_id)?
            .ok_or_else(|| VoteEventError::UnknownSong(mutation.setlist_song_id.clone()))?;

        let now = Utc::now().timestamp();
        self.mirror_vote(&mutation, now);

        // The one fatal step: a vote that cannot reach the counters is
        // a failed event, everything after degrades gracefully.
        let tally = self.vote_store.apply_tally_delta(
            &mutation.setlist_song_id,
            mutation.up_delta,
            mutation.down_delta,
        )?;

        let alerts_triggered = self.run_anomaly_checks(&mutation, &context, &tally, now);

        let ratio = positive_ratio(tally.upvotes, tally.downvotes);
        let velocity = self.scoring_velocity(&tally.setlist_song_id, now);
        let score = self.update_song_score(&tally, velocity, ratio, now);

        self.publish_update(&context, &tally, velocity, ratio, score, now)
            .await;

        Ok(VoteEventOutcome {
            success: true,
            processed: true,
            event_type: event.event_type.clone(),
            alerts_triggered,
        })
    }

    /// Keep the local vote mirror and the event log in step with the
    /// upstream row. Best-effort: a mirror miss skews velocity a
    /// little, it never loses the vote.
    fn mirror_vote(&self, mutation: &VoteMutation, now: i64) {
        let mirror_result = match (&mutation.vote, &mutation.deleted_vote_id) {
            (Some(record), _) => self.vote_store.upsert_vote(&Vote {
                id: record.id.clone(),
                voter_id: record.voter_id.clone(),
                setlist_song_id: record.setlist_song_id.clone(),
                vote_type: record.vote_type,
                created_at: record.created_at,
            }),
            (None, Some(vote_id)) => self.vote_store.delete_vote(vote_id),
            (None, None) => Ok(()),
        };
        if let Err(e) = mirror_result {
            warn!("Failed to mirror vote row: {:#}", e);
        }

        if let Err(e) = self.vote_store.record_vote_event(
            &mutation.setlist_song_id,
            &mutation.voter_id,
            mutation.kind,
            now,
        ) {
            warn!("Failed to record vote event: {:#}", e);
        }
    }

    fn run_anomaly_checks(
        &self,
        mutation: &VoteMutation,
        context: &SongContext,
        tally: &SetlistSongTally,
        now: i64,
    ) -> usize {
        let velocity = self
            .velocity
            .song_votes_per_minute(&mutation.setlist_song_id, now, self.anomaly.velocity_window())
            .unwrap_or_else(|e| {
                warn!("Failed to compute anomaly velocity: {:#}", e);
                0.0
            });
        let voter_events = self
            .velocity
            .voter_events_in_window(
                &mutation.voter_id,
                &mutation.setlist_song_id,
                now,
                self.anomaly.voter_burst_window(),
            )
            .unwrap_or_else(|e| {
                warn!("Failed to count voter events: {:#}", e);
                0
            });

        let findings = self.detector.evaluate(&AnomalyInput {
            tally,
            voter_id: &mutation.voter_id,
            velocity_per_minute: velocity,
            voter_events_in_window: voter_events,
        });

        for finding in &findings {
            let alert = Alert {
                id: Uuid::new_v4().to_string(),
                kind: finding.kind.as_str().to_string(),
                setlist_song_id: mutation.setlist_song_id.clone(),
                show_id: context.show_id.clone(),
                voter_id: Some(mutation.voter_id.clone()),
                message: finding.message.clone(),
                details: finding.details.clone(),
                created_at: now,
            };
            match self.server_store.insert_alert(&alert) {
                Ok(()) => metrics::record_alert(finding.kind.as_str()),
                Err(e) => warn!("Failed to persist {} alert: {:#}", finding.kind.as_str(), e),
            }
        }

        findings.len()
    }

    fn scoring_velocity(&self, setlist_song_id: &str, now: i64) -> f64 {
        self.velocity
            .song_votes_per_minute(setlist_song_id, now, self.scoring.velocity_window())
            .unwrap_or_else(|e| {
                warn!("Failed to compute scoring velocity: {:#}", e);
                0.0
            })
    }

    /// Refresh the song's incremental trending snapshot. Losing one
    /// update is fine, the next vote or the batch job repairs it.
    fn update_song_score(
        &self,
        tally: &SetlistSongTally,
        velocity: f64,
        ratio: f64,
        now: i64,
    ) -> f64 {
        let score = incremental_song_score(velocity, tally.total_votes(), ratio, &self.scoring);

        let snapshot = TrendingSnapshot {
            entity_id: tally.setlist_song_id.clone(),
            entity_type: TrendingEntityType::Song,
            score,
            velocity,
            total_votes: tally.total_votes(),
            positive_ratio: ratio,
            computed_at: now,
        };
        match self.server_store.upsert_trending_snapshot(&snapshot) {
            Ok(true) => metrics::record_snapshot_upsert(TrendingEntityType::Song.as_str()),
            Ok(false) => debug!("Song snapshot superseded by a newer computation"),
            Err(e) => warn!("Failed to upsert song snapshot: {:#}", e),
        }

        score
    }

    async fn publish_update(
        &self,
        context: &SongContext,
        tally: &SetlistSongTally,
        velocity: f64,
        ratio: f64,
        score: f64,
        now: i64,
    ) {
        let message = VoteUpdateMessage {
            show_id: context.show_id.clone(),
            setlist_song_id: tally.setlist_song_id.clone(),
            upvotes: tally.upvotes,
            downvotes: tally.downvotes,
            total_votes: tally.total_votes(),
            positive_ratio: ratio,
            velocity,
            score,
            timestamp: now,
        };

        let publish = self.broadcaster.publish(&context.show_id, message);
        match tokio::time::timeout(self.broadcast.publish_timeout(), publish).await {
            Ok(Ok(failed)) if failed > 0 => {
                debug!("Broadcast skipped {} unreachable subscribers", failed)
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Broadcast failed: {:#}", e),
            Err(_) => warn!(
                "Broadcast timed out after {:?}",
                self.broadcast.publish_timeout()
            ),
        }
    }
}
