use super::context::JobContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// A cron expression evaluated in a fixed timezone.
///
/// Expressions use the six-field format `sec min hour day-of-month month day-of-week`.
#[derive(Debug, Clone)]
pub struct CronSpec {
    pub expression: String,
    pub timezone: Tz,
    schedule: Schedule,
}

impl CronSpec {
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, String> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| format!("Invalid cron expression '{}': {}", expression, e))?;
        let timezone: Tz = timezone
            .parse()
            .map_err(|e| format!("Invalid timezone '{}': {}", timezone, e))?;
        Ok(Self {
            expression: expression.to_string(),
            timezone,
            schedule,
        })
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Schedule for when a job should run.
#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Run at specific times using cron syntax
    Cron(CronSpec),
    /// Run at fixed intervals
    Interval(Duration),
    /// Run only in response to hooks
    Hook(HookEvent),
    /// Combination of scheduled and hook-triggered
    Combined {
        cron: Option<CronSpec>,
        interval: Option<Duration>,
        hooks: Vec<HookEvent>,
    },
}

impl JobSchedule {
    pub fn cron(&self) -> Option<&CronSpec> {
        match self {
            JobSchedule::Cron(spec) => Some(spec),
            JobSchedule::Combined { cron, .. } => cron.as_ref(),
            _ => None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        match self {
            JobSchedule::Interval(interval) => Some(*interval),
            JobSchedule::Combined { interval, .. } => *interval,
            _ => None,
        }
    }

    pub fn listens_to(&self, event: HookEvent) -> bool {
        match self {
            JobSchedule::Hook(hook_event) => *hook_event == event,
            JobSchedule::Combined { hooks, .. } => hooks.contains(&event),
            _ => false,
        }
    }
}

/// Events that can trigger hook-based jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    OnStartup,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::OnStartup => write!(f, "OnStartup"),
        }
    }
}

/// How a job should be handled during server shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownBehavior {
    /// Job can be cancelled immediately
    #[default]
    Cancellable,
    /// Wait for job to complete before shutdown
    WaitForCompletion,
}

/// Errors that can occur during job execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,

    #[error("Job is already running")]
    AlreadyRunning,

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Job was cancelled")]
    Cancelled,
}

/// Trait for background jobs.
///
/// Jobs run on the tokio runtime. Blocking work belongs in `spawn_blocking`,
/// and long-running jobs should check `ctx.is_cancelled()`.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// How this job should be handled during shutdown.
    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    /// Execute the job.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
