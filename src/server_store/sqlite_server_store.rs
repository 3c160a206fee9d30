use super::models::{
    Alert, JobAuditEntry, JobRun, JobRunStatus, JobScheduleState, TrendingEntityType,
    TrendingSnapshot,
};
use super::ServerStore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS job_runs (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    error TEXT
);
CREATE INDEX IF NOT EXISTS idx_job_runs_job ON job_runs(job_id, started_at);

CREATE TABLE IF NOT EXISTS job_schedules (
    job_id TEXT PRIMARY KEY,
    last_run_at TEXT,
    next_run_at TEXT
);

CREATE TABLE IF NOT EXISTS job_audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    action TEXT NOT NULL,
    details TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_job_audit_job ON job_audit_log(job_id, created_at);

CREATE TABLE IF NOT EXISTS trending_snapshots (
    entity_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    score REAL NOT NULL,
    velocity REAL NOT NULL DEFAULT 0,
    total_votes INTEGER NOT NULL,
    positive_ratio REAL NOT NULL DEFAULT 0.5,
    computed_at INTEGER NOT NULL,
    PRIMARY KEY (entity_id, entity_type)
);
CREATE INDEX IF NOT EXISTS idx_trending_type_score ON trending_snapshots(entity_type, score);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    setlist_song_id TEXT NOT NULL,
    show_id TEXT NOT NULL,
    voter_id TEXT,
    message TEXT NOT NULL,
    details TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_created ON alerts(created_at);

CREATE TABLE IF NOT EXISTS job_leases (
    name TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);
";

pub struct SqliteServerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteServerStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open server database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        if is_new_db {
            info!("Creating new server database at {:?}", path);
        }
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize server schema")?;
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_job_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
        let status_str: String = row.get("status")?;
        let started_at: String = row.get("started_at")?;
        let finished_at: Option<String> = row.get("finished_at")?;
        Ok(JobRun {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            status: JobRunStatus::parse(&status_str).unwrap_or(JobRunStatus::Failed),
            started_at: parse_timestamp(&started_at),
            finished_at: finished_at.as_deref().map(parse_timestamp),
            error: row.get("error")?,
        })
    }

    fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<TrendingSnapshot> {
        let type_str: String = row.get("entity_type")?;
        Ok(TrendingSnapshot {
            entity_id: row.get("entity_id")?,
            entity_type: TrendingEntityType::parse(&type_str)
                .unwrap_or(TrendingEntityType::Song),
            score: row.get("score")?,
            velocity: row.get("velocity")?,
            total_votes: row.get("total_votes")?,
            positive_ratio: row.get("positive_ratio")?,
            computed_at: row.get("computed_at")?,
        })
    }

    fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
        let details_str: String = row.get("details")?;
        Ok(Alert {
            id: row.get("id")?,
            kind: row.get("kind")?,
            setlist_song_id: row.get("setlist_song_id")?,
            show_id: row.get("show_id")?,
            voter_id: row.get("voter_id")?,
            message: row.get("message")?,
            details: serde_json::from_str(&details_str).unwrap_or(serde_json::Value::Null),
            created_at: row.get("created_at")?,
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl ServerStore for SqliteServerStore {
    fn create_job_run(&self, job_id: &str) -> Result<JobRun> {
        let run = JobRun {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            status: JobRunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_runs (id, job_id, status, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                run.id,
                run.job_id,
                run.status.as_str(),
                run.started_at.to_rfc3339()
            ],
        )?;
        Ok(run)
    }

    fn complete_job_run(
        &self,
        run_id: &str,
        status: JobRunStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE job_runs SET status = ?2, finished_at = ?3, error = ?4 WHERE id = ?1",
            params![run_id, status.as_str(), Utc::now().to_rfc3339(), error],
        )?;
        if updated == 0 {
            return Err(anyhow!("job run {} not found", run_id));
        }
        Ok(())
    }

    fn get_job_runs(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, status, started_at, finished_at, error
             FROM job_runs WHERE job_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(params![job_id, limit as i64], Self::row_to_job_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn mark_stale_jobs_failed(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE job_runs SET status = 'failed', finished_at = ?1,
             error = 'marked stale on startup' WHERE status = 'running'",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(updated)
    }

    fn get_job_schedule(&self, job_id: &str) -> Result<Option<JobScheduleState>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT job_id, last_run_at, next_run_at FROM job_schedules WHERE job_id = ?1",
        )?;
        let state = stmt
            .query_row(params![job_id], |row| {
                let last: Option<String> = row.get("last_run_at")?;
                let next: Option<String> = row.get("next_run_at")?;
                Ok(JobScheduleState {
                    job_id: row.get("job_id")?,
                    last_run_at: last.as_deref().map(parse_timestamp),
                    next_run_at: next.as_deref().map(parse_timestamp),
                })
            })
            .optional()?;
        Ok(state)
    }

    fn update_job_schedule(
        &self,
        job_id: &str,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_schedules (job_id, last_run_at, next_run_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(job_id) DO UPDATE SET last_run_at = ?2, next_run_at = ?3",
            params![
                job_id,
                last_run_at.map(|dt| dt.to_rfc3339()),
                next_run_at.map(|dt| dt.to_rfc3339())
            ],
        )?;
        Ok(())
    }

    fn log_job_audit(&self, job_id: &str, action: &str, details: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_audit_log (job_id, action, details, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![job_id, action, details.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get_job_audit_log(&self, job_id: &str, limit: usize) -> Result<Vec<JobAuditEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, action, details, created_at FROM job_audit_log
             WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![job_id, limit as i64], |row| {
                let details_str: String = row.get("details")?;
                let created_at: String = row.get("created_at")?;
                Ok(JobAuditEntry {
                    id: row.get("id")?,
                    job_id: row.get("job_id")?,
                    action: row.get("action")?,
                    details: serde_json::from_str(&details_str)
                        .unwrap_or(serde_json::Value::Null),
                    created_at: parse_timestamp(&created_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn upsert_trending_snapshot(&self, snapshot: &TrendingSnapshot) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        // The WHERE on the conflict branch keeps computed_at monotonic:
        // a stale recompute racing a fresher one loses.
        let written = conn.execute(
            "INSERT INTO trending_snapshots
                 (entity_id, entity_type, score, velocity, total_votes, positive_ratio, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(entity_id, entity_type) DO UPDATE SET
                 score = excluded.score,
                 velocity = excluded.velocity,
                 total_votes = excluded.total_votes,
                 positive_ratio = excluded.positive_ratio,
                 computed_at = excluded.computed_at
             WHERE excluded.computed_at >= trending_snapshots.computed_at",
            params![
                snapshot.entity_id,
                snapshot.entity_type.as_str(),
                snapshot.score,
                snapshot.velocity,
                snapshot.total_votes,
                snapshot.positive_ratio,
                snapshot.computed_at
            ],
        )?;
        Ok(written > 0)
    }

    fn get_trending_snapshots(
        &self,
        entity_type: TrendingEntityType,
        limit: usize,
    ) -> Result<Vec<TrendingSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT entity_id, entity_type, score, velocity, total_votes, positive_ratio, computed_at
             FROM trending_snapshots WHERE entity_type = ?1
             ORDER BY score DESC LIMIT ?2",
        )?;
        let snapshots = stmt
            .query_map(params![entity_type.as_str(), limit as i64], Self::row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(snapshots)
    }

    fn get_trending_snapshot(
        &self,
        entity_id: &str,
        entity_type: TrendingEntityType,
    ) -> Result<Option<TrendingSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT entity_id, entity_type, score, velocity, total_votes, positive_ratio, computed_at
             FROM trending_snapshots WHERE entity_id = ?1 AND entity_type = ?2",
        )?;
        Ok(stmt
            .query_row(params![entity_id, entity_type.as_str()], Self::row_to_snapshot)
            .optional()?)
    }

    fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts
                 (id, kind, setlist_song_id, show_id, voter_id, message, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                alert.id,
                alert.kind,
                alert.setlist_song_id,
                alert.show_id,
                alert.voter_id,
                alert.message,
                alert.details.to_string(),
                alert.created_at
            ],
        )?;
        Ok(())
    }

    fn list_alerts(&self, limit: usize, offset: usize) -> Result<Vec<Alert>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, kind, setlist_song_id, show_id, voter_id, message, details, created_at
             FROM alerts ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let alerts = stmt
            .query_map(params![limit as i64, offset as i64], Self::row_to_alert)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alerts)
    }

    fn try_acquire_lease(&self, name: &str, holder: &str, ttl_secs: i64, now: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let expires_at = now + ttl_secs;
        // Takes the lease when it is free, expired, or a re-acquire by
        // the current holder. Anything else leaves the row untouched.
        let written = conn.execute(
            "INSERT INTO job_leases (name, holder, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET holder = excluded.holder,
                 expires_at = excluded.expires_at
             WHERE job_leases.expires_at <= ?4 OR job_leases.holder = excluded.holder",
            params![name, holder, expires_at, now],
        )?;
        Ok(written > 0)
    }

    fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM job_leases WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(())
    }
}
