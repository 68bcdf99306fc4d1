//! Background job scheduling and execution system.
//!
//! Jobs run on cron, interval or hook schedules evaluated against an injected
//! [`Clock`](crate::clock::Clock), so tests can drive them with a manual clock.

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, JobRunInfo, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, CronSpec, HookEvent, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobScheduler};
