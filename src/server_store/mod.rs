mod models;
mod sqlite_server_store;

pub use models::{
    Alert, JobAuditEntry, JobRun, JobRunStatus, JobScheduleState, TrendingEntityType,
    TrendingSnapshot,
};
pub use sqlite_server_store::SqliteServerStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

/// Server-side operational state: trending snapshots, anomaly alerts,
/// background job bookkeeping and the recompute lease.
pub trait ServerStore: Send + Sync {
    // Job runs

    fn create_job_run(&self, job_id: &str) -> Result<JobRun>;
    fn complete_job_run(&self, run_id: &str, status: JobRunStatus, error: Option<&str>)
        -> Result<()>;
    fn get_job_runs(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>>;

    /// Flip any run still marked running to failed. Called once on
    /// startup so a crash does not leave runs dangling forever.
    fn mark_stale_jobs_failed(&self) -> Result<usize>;

    // Job schedules

    fn get_job_schedule(&self, job_id: &str) -> Result<Option<JobScheduleState>>;
    fn update_job_schedule(
        &self,
        job_id: &str,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    // Job audit log

    fn log_job_audit(&self, job_id: &str, action: &str, details: &serde_json::Value) -> Result<()>;
    fn get_job_audit_log(&self, job_id: &str, limit: usize) -> Result<Vec<JobAuditEntry>>;

    // Trending snapshots

    /// Upsert a snapshot, keeping the newest computation. An incoming
    /// snapshot with `computed_at` older than the stored row is dropped.
    /// Returns whether the row was written.
    fn upsert_trending_snapshot(&self, snapshot: &TrendingSnapshot) -> Result<bool>;

    /// Snapshots of one entity type ordered by score descending.
    fn get_trending_snapshots(
        &self,
        entity_type: TrendingEntityType,
        limit: usize,
    ) -> Result<Vec<TrendingSnapshot>>;

    fn get_trending_snapshot(
        &self,
        entity_id: &str,
        entity_type: TrendingEntityType,
    ) -> Result<Option<TrendingSnapshot>>;

    // Alerts

    fn insert_alert(&self, alert: &Alert) -> Result<()>;

    /// Newest alerts first.
    fn list_alerts(&self, limit: usize, offset: usize) -> Result<Vec<Alert>>;

    // Recompute lease

    /// Try to take the named lease until `now + ttl_secs`. Succeeds when
    /// the lease is free, expired, or already held by `holder`. Returns
    /// whether the lease was acquired.
    fn try_acquire_lease(&self, name: &str, holder: &str, ttl_secs: i64, now: i64) -> Result<bool>;

    /// Release the lease if `holder` still owns it.
    fn release_lease(&self, name: &str, holder: &str) -> Result<()>;
}
