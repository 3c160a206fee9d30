use super::context::JobContext;
use std::time::Duration;
use thiserror::Error;

/// Events that can trigger a job outside its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    OnStartup,
}

/// When a job runs.
#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Run every `Duration`, measured from the previous completion.
    Interval(Duration),
    /// Run only when the hook fires.
    Hook(HookEvent),
    /// Interval runs plus hook-triggered runs.
    Combined {
        interval: Duration,
        hooks: Vec<HookEvent>,
    },
}

impl JobSchedule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            JobSchedule::Interval(d) => Some(*d),
            JobSchedule::Combined { interval, .. } => Some(*interval),
            JobSchedule::Hook(_) => None,
        }
    }

    pub fn triggers_on(&self, event: HookEvent) -> bool {
        match self {
            JobSchedule::Hook(hook) => *hook == event,
            JobSchedule::Combined { hooks, .. } => hooks.contains(&event),
            JobSchedule::Interval(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job execution failed: {0}")]
    ExecutionFailed(String),
    #[error("job cancelled")]
    Cancelled,
}

/// A unit of scheduled background work. Execution is synchronous and
/// runs on the blocking pool; long loops should poll
/// `context.is_cancelled()` between work items.
pub trait BackgroundJob: Send + Sync {
    /// Stable identifier used for run history and schedule persistence.
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schedule(&self) -> JobSchedule;

    fn execute(&self, context: &JobContext) -> Result<(), JobError>;
}
