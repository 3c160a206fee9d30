use super::context::JobContext;
use super::job::{BackgroundJob, HookEvent, JobError, JobSchedule};
use crate::catalog_store::CatalogStore;
use crate::server::metrics;
use crate::server_store::{JobRunStatus, ServerStore};
use crate::vote_store::VoteStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const HOOK_CHANNEL_CAPACITY: usize = 16;

/// Runs registered jobs on their schedules until shutdown.
///
/// Jobs execute one at a time on the blocking pool; schedule state is
/// persisted so interval timing survives restarts.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn BackgroundJob>>,
    context: JobContext,
    server_store: Arc<dyn ServerStore>,
    shutdown: CancellationToken,
    hook_tx: mpsc::Sender<HookEvent>,
    hook_rx: mpsc::Receiver<HookEvent>,
}

impl JobScheduler {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        vote_store: Arc<dyn VoteStore>,
        server_store: Arc<dyn ServerStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let (hook_tx, hook_rx) = mpsc::channel(HOOK_CHANNEL_CAPACITY);
        let context = JobContext::new(
            catalog_store,
            vote_store,
            server_store.clone(),
            shutdown.clone(),
        );
        Self {
            jobs: Vec::new(),
            context,
            server_store,
            shutdown,
            hook_tx,
            hook_rx,
        }
    }

    pub fn register(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registered background job '{}' ({})", job.name(), job.id());
        self.jobs.push(job);
    }

    /// Handle for firing hooks from elsewhere in the process.
    pub fn hook_sender(&self) -> mpsc::Sender<HookEvent> {
        self.hook_tx.clone()
    }

    pub async fn run(mut self) {
        match self.server_store.mark_stale_jobs_failed() {
            Ok(0) => {}
            Ok(n) => warn!("Marked {} stale job runs as failed", n),
            Err(e) => error!("Failed to mark stale job runs: {:#}", e),
        }

        let mut next_runs = self.load_next_runs();

        let startup_jobs: Vec<_> = self
            .jobs
            .iter()
            .filter(|j| j.schedule().triggers_on(HookEvent::OnStartup))
            .cloned()
            .collect();
        for job in startup_jobs {
            self.run_job(&job, &mut next_runs).await;
        }

        loop {
            let sleep_for = self.time_until_next_due(&next_runs);

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Job scheduler shutting down");
                    break;
                }
                Some(event) = self.hook_rx.recv() => {
                    let triggered: Vec<_> = self
                        .jobs
                        .iter()
                        .filter(|j| j.schedule().triggers_on(event))
                        .cloned()
                        .collect();
                    for job in triggered {
                        self.run_job(&job, &mut next_runs).await;
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {
                    let now = Utc::now();
                    let due: Vec<_> = self
                        .jobs
                        .iter()
                        .filter(|j| {
                            next_runs
                                .get(j.id())
                                .map(|at| *at <= now)
                                .unwrap_or(false)
                        })
                        .cloned()
                        .collect();
                    for job in due {
                        self.run_job(&job, &mut next_runs).await;
                    }
                }
            }
        }
    }

    /// Initial next-run times, preferring what a previous process
    /// persisted over starting every interval from scratch.
    fn load_next_runs(&self) -> HashMap<String, DateTime<Utc>> {
        let mut next_runs = HashMap::new();
        for job in &self.jobs {
            let Some(interval) = job.schedule().interval() else {
                continue;
            };
            let persisted = self
                .server_store
                .get_job_schedule(job.id())
                .ok()
                .flatten()
                .and_then(|s| s.next_run_at);
            let next = persisted
                .unwrap_or_else(|| Utc::now() + chrono_interval(interval));
            next_runs.insert(job.id().to_string(), next);
        }
        next_runs
    }

    fn time_until_next_due(&self, next_runs: &HashMap<String, DateTime<Utc>>) -> Duration {
        let now = Utc::now();
        next_runs
            .values()
            .map(|at| (*at - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .unwrap_or(Duration::from_secs(60))
    }

    async fn run_job(
        &self,
        job: &Arc<dyn BackgroundJob>,
        next_runs: &mut HashMap<String, DateTime<Utc>>,
    ) {
        let job_id = job.id().to_string();
        let run = match self.server_store.create_job_run(&job_id) {
            Ok(run) => run,
            Err(e) => {
                error!("Failed to create run record for '{}': {:#}", job_id, e);
                return;
            }
        };

        info!("Starting background job '{}'", job.name());
        metrics::set_background_job_running(&job_id, true);
        let started = Instant::now();

        let context = self.context.clone();
        let job_clone = job.clone();
        let result =
            tokio::task::spawn_blocking(move || job_clone.execute(&context)).await;

        let (status, error_msg) = match result {
            Ok(Ok(())) => (JobRunStatus::Completed, None),
            Ok(Err(JobError::Cancelled)) => (JobRunStatus::Cancelled, None),
            Ok(Err(e)) => (JobRunStatus::Failed, Some(e.to_string())),
            Err(e) => (JobRunStatus::Failed, Some(format!("job panicked: {}", e))),
        };

        let elapsed = started.elapsed();
        metrics::set_background_job_running(&job_id, false);
        metrics::record_background_job_execution(&job_id, status.as_str(), elapsed.as_secs_f64());

        match &error_msg {
            None => info!(
                "Background job '{}' {} in {:?}",
                job.name(),
                status.as_str(),
                elapsed
            ),
            Some(msg) => error!("Background job '{}' failed: {}", job.name(), msg),
        }

        if let Err(e) =
            self.server_store
                .complete_job_run(&run.id, status, error_msg.as_deref())
        {
            error!("Failed to finalize run record for '{}': {:#}", job_id, e);
        }

        if let Some(interval) = job.schedule().interval() {
            let now = Utc::now();
            let next = now + chrono_interval(interval);
            next_runs.insert(job_id.clone(), next);
            if let Err(e) = self
                .server_store
                .update_job_schedule(&job_id, Some(now), Some(next))
            {
                warn!("Failed to persist schedule for '{}': {:#}", job_id, e);
            }
        }
    }
}

fn chrono_interval(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::seconds(60))
}
