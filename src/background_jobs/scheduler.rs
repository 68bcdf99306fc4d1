use super::context::JobContext;
use super::handle::{JobRun, JobRunStatus, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior};
use crate::clock::Clock;
use crate::server::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest the scheduler loop sleeps before re-evaluating schedules.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Currently running jobs with their task handles (not shared, managed by scheduler loop)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Source of "now" for every schedule decision.
    clock: Arc<dyn Clock>,
}

impl JobScheduler {
    pub fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        clock: Arc<dyn Clock>,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            command_receiver,
            shutdown_token,
            clock,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());

        let now = self.clock.now();
        let mut state = self.shared_state.write().await;
        match first_run_time(&job.schedule(), now) {
            Some(next_run) => {
                debug!("Job {} first scheduled for {}", job_id, next_run);
                state.next_runs.insert(job_id.clone(), next_run);
            }
            None => {
                state.next_runs.remove(&job_id);
            }
        }
        state.jobs.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        // Fire OnStartup hooks
        self.fire_hook(HookEvent::OnStartup).await;

        loop {
            // Clean up completed job handles
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    /// Handle a command from the SchedulerHandle.
    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }

        if state.running_jobs.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    /// Calculate time until the next scheduled job should run.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let now = self.clock.now();
        let state = self.shared_state.read().await;

        let mut min_duration = MAX_SLEEP;
        for (job_id, next_run) in &state.next_runs {
            if state.running_jobs.contains(job_id) {
                continue; // Skip already running jobs
            }
            if *next_run <= now {
                // Job is due now
                return Duration::ZERO;
            }
            let duration = (*next_run - now).to_std().unwrap_or(Duration::from_secs(1));
            min_duration = min_duration.min(duration);
        }

        min_duration
    }

    /// Run all jobs that are due for scheduled execution.
    pub async fn run_due_jobs(&mut self) {
        let now = self.clock.now();
        let mut jobs_to_run = Vec::new();

        {
            let mut state = self.shared_state.write().await;
            let due: Vec<String> = state
                .next_runs
                .iter()
                .filter(|(_, next_run)| **next_run <= now)
                .map(|(job_id, _)| job_id.clone())
                .collect();

            for job_id in due {
                if state.running_jobs.contains(&job_id) {
                    // Drop the missed tick instead of running again right after
                    if let Some(next_run) = state
                        .jobs
                        .get(&job_id)
                        .and_then(|job| next_run_time(&job.schedule(), now))
                    {
                        debug!(
                            "Job {} still running at scheduled time, next run at {}",
                            job_id, next_run
                        );
                        state.next_runs.insert(job_id, next_run);
                    }
                    continue;
                }
                jobs_to_run.push(job_id);
            }
        }

        for job_id in jobs_to_run {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Trigger all jobs that listen for a specific hook event.
    pub async fn fire_hook(&mut self, event: HookEvent) {
        let mut jobs_to_trigger = Vec::new();

        {
            let state = self.shared_state.read().await;
            for (job_id, job) in &state.jobs {
                if state.running_jobs.contains(job_id) {
                    debug!("Skipping hook trigger for already running job: {}", job_id);
                    continue;
                }

                if job.schedule().listens_to(event) {
                    jobs_to_trigger.push(job_id.clone());
                }
            }
        }

        for job_id in jobs_to_trigger {
            let trigger = format!("hook:{}", event);
            self.spawn_job(&job_id, &trigger).await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let now = self.clock.now();
        let job = {
            let mut state = self.shared_state.write().await;
            let job = match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            };

            state.running_jobs.insert(job_id.to_string());
            state.last_runs.insert(
                job_id.to_string(),
                JobRun {
                    started_at: now,
                    finished_at: None,
                    status: JobRunStatus::Running,
                    error_message: None,
                    triggered_by: triggered_by.to_string(),
                },
            );

            // Move the next run forward now so the loop does not spin on a due job
            match next_run_time(&job.schedule(), now) {
                Some(next_run) => {
                    state.next_runs.insert(job_id.to_string(), next_run);
                }
                None => {
                    state.next_runs.remove(job_id);
                }
            }
            job
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);

        // Create cancellation token for this job
        let cancel_token = self.shutdown_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());

        let ctx = JobContext::new(cancel_token, triggered_by);
        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);
        let clock = Arc::clone(&self.clock);

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            // Run in its own task so a panic surfaces as a JoinError
            let result = tokio::spawn(async move { job.execute(&ctx).await }).await;
            let elapsed = start_time.elapsed();

            let (status, error_msg, status_label) = match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                    (JobRunStatus::Completed, None, "success")
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (
                        JobRunStatus::Failed,
                        Some("Cancelled".to_string()),
                        "cancelled",
                    )
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()), "failed")
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (
                        JobRunStatus::Failed,
                        Some(format!("Task panic: {}", e)),
                        "panic",
                    )
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status_label, elapsed);

            let mut state = shared_state.write().await;
            state.running_jobs.remove(&job_id_owned);
            if let Some(run) = state.last_runs.get_mut(&job_id_owned) {
                run.finished_at = Some(clock.now());
                run.status = status;
                run.error_message = error_msg;
            }
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Re-anchor interval schedules on completion time.
    async fn update_schedule_after_run(&self, job_id: &str) {
        let mut state = self.shared_state.write().await;
        let Some(job) = state.jobs.get(job_id).cloned() else {
            return;
        };
        let schedule = job.schedule();
        if schedule.interval().is_none() {
            return;
        }
        if let Some(next_run) = next_run_time(&schedule, self.clock.now()) {
            state.next_runs.insert(job_id.to_string(), next_run);
        }
    }

    /// Clean up handles for completed jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);
            self.update_schedule_after_run(&job_id).await;
        }
    }

    /// Wait for every job spawned so far to finish.
    pub async fn join_running_jobs(&mut self) {
        let handles: Vec<(String, JoinHandle<()>)> = self.running_handles.drain().collect();
        for (job_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!("Job task {} ended abnormally: {}", job_id, e);
            }
            self.job_cancel_tokens.remove(&job_id);
            self.update_schedule_after_run(&job_id).await;
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        // Cancel cancellable jobs
        {
            let state = self.shared_state.read().await;
            for job_id in &state.running_jobs {
                if let Some(job) = state.jobs.get(job_id) {
                    if job.shutdown_behavior() == ShutdownBehavior::Cancellable {
                        if let Some(token) = self.job_cancel_tokens.get(job_id) {
                            debug!("Cancelling job: {}", job_id);
                            token.cancel();
                        }
                    }
                }
            }
        }

        // Wait for all jobs to complete
        let mut wait_jobs = Vec::new();
        for (job_id, handle) in self.running_handles.drain() {
            let behavior = {
                let state = self.shared_state.read().await;
                state
                    .jobs
                    .get(&job_id)
                    .map(|j| j.shutdown_behavior())
                    .unwrap_or(ShutdownBehavior::Cancellable)
            };
            wait_jobs.push((job_id, handle, behavior));
        }

        for (job_id, handle, behavior) in wait_jobs {
            if behavior == ShutdownBehavior::WaitForCompletion {
                info!("Waiting for job {} to complete...", job_id);
            }
            let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// When a freshly registered job first runs. Interval jobs run right away.
fn first_run_time(schedule: &JobSchedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cron = schedule.cron().and_then(|spec| spec.next_after(now));
    let interval = schedule.interval().map(|_| now);
    earliest(cron, interval)
}

/// When a job that ran (or was due) at `now` runs next.
fn next_run_time(schedule: &JobSchedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cron = schedule.cron().and_then(|spec| spec.next_after(now));
    let interval = schedule
        .interval()
        .map(|interval| now + chrono::Duration::from_std(interval).unwrap_or_default());
    earliest(cron, interval)
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    clock: Arc<dyn Clock>,
    shutdown_token: CancellationToken,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = JobScheduler::new(
        command_rx,
        shutdown_token,
        clock,
        Arc::clone(&shared_state),
    );

    let handle = SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::job::CronSpec;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // Test job implementation
    struct TestJob {
        id: &'static str,
        schedule: JobSchedule,
        execution_count: Arc<AtomicUsize>,
        should_fail: Arc<AtomicBool>,
    }

    impl TestJob {
        fn new(id: &'static str, schedule: JobSchedule) -> Self {
            Self {
                id,
                schedule,
                execution_count: Arc::new(AtomicUsize::new(0)),
                should_fail: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> JobSchedule {
            self.schedule.clone()
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.execution_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail.load(Ordering::SeqCst) {
                Err(JobError::ExecutionFailed("Test failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl BackgroundJob for PanickingJob {
        fn id(&self) -> &'static str {
            "panicking_job"
        }
        fn name(&self) -> &'static str {
            "Panicking Job"
        }
        fn description(&self) -> &'static str {
            "Always panics"
        }
        fn schedule(&self) -> JobSchedule {
            JobSchedule::Hook(HookEvent::OnStartup)
        }
        async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            panic!("boom");
        }
    }

    struct SlowJob;

    #[async_trait]
    impl BackgroundJob for SlowJob {
        fn id(&self) -> &'static str {
            "slow_job"
        }
        fn name(&self) -> &'static str {
            "Slow Job"
        }
        fn description(&self) -> &'static str {
            "Takes a while unless cancelled"
        }
        fn schedule(&self) -> JobSchedule {
            JobSchedule::Hook(HookEvent::OnStartup)
        }
        async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(10)) => Ok(()),
                _ = ctx.cancellation_token.cancelled() => Err(JobError::Cancelled),
            }
        }
    }

    fn start_time() -> DateTime<Utc> {
        // 14:00 in Europe/Zagreb
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn midnight_job(id: &'static str) -> TestJob {
        TestJob::new(
            id,
            JobSchedule::Cron(CronSpec::parse("0 0 0 * * *", "Europe/Zagreb").unwrap()),
        )
    }

    fn create_test_scheduler() -> (JobScheduler, SchedulerHandle, Arc<ManualClock>, CancellationToken)
    {
        let clock = Arc::new(ManualClock::new(start_time()));
        let shutdown_token = CancellationToken::new();
        let (scheduler, handle) = create_scheduler(clock.clone(), shutdown_token.clone());
        (scheduler, handle, clock, shutdown_token)
    }

    #[tokio::test]
    async fn test_register_job() {
        let (mut scheduler, handle, _clock, _token) = create_test_scheduler();

        scheduler
            .register_job(Arc::new(TestJob::new(
                "test_job",
                JobSchedule::Hook(HookEvent::OnStartup),
            )))
            .await;

        assert_eq!(scheduler.job_count().await, 1);
        assert!(handle.job_exists("test_job").await);
        assert!(!handle.job_exists("nonexistent").await);

        let jobs = handle.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "test_job");
        assert_eq!(jobs[0].name, "Test Job");
        assert!(!jobs[0].is_running);
        assert!(jobs[0].last_run.is_none());
        assert!(jobs[0].next_run_at.is_none());
    }

    #[tokio::test]
    async fn test_list_jobs_sorted_by_id() {
        let (mut scheduler, handle, _clock, _token) = create_test_scheduler();

        for id in ["job_c", "job_a", "job_b"] {
            scheduler
                .register_job(Arc::new(TestJob::new(
                    id,
                    JobSchedule::Hook(HookEvent::OnStartup),
                )))
                .await;
        }

        let ids: Vec<String> = handle.list_jobs().await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["job_a", "job_b", "job_c"]);
        assert!(handle.get_job("job_b").await.is_some());
        assert!(handle.get_job("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_cron_job_first_run_is_next_midnight() {
        let (mut scheduler, handle, _clock, _token) = create_test_scheduler();
        scheduler.register_job(Arc::new(midnight_job("cron_job"))).await;

        let job = handle.get_job("cron_job").await.unwrap();
        assert_eq!(job.next_run_at.as_deref(), Some("2024-05-01T22:00:00+00:00"));
        assert_eq!(job.schedule.schedule_type, "cron");
    }

    #[tokio::test]
    async fn test_cron_job_runs_only_when_due() {
        let (mut scheduler, handle, clock, _token) = create_test_scheduler();
        let job = midnight_job("cron_job");
        let count = job.execution_count.clone();
        scheduler.register_job(Arc::new(job)).await;

        scheduler.run_due_jobs().await;
        scheduler.join_running_jobs().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // One second before midnight in Zagreb
        clock.set(Utc.with_ymd_and_hms(2024, 5, 1, 21, 59, 59).unwrap());
        scheduler.run_due_jobs().await;
        scheduler.join_running_jobs().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.advance(chrono::Duration::seconds(1));
        scheduler.run_due_jobs().await;
        scheduler.join_running_jobs().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Same instant again: already rescheduled for the next day
        scheduler.run_due_jobs().await;
        scheduler.join_running_jobs().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let info = handle.get_job("cron_job").await.unwrap();
        assert_eq!(info.next_run_at.as_deref(), Some("2024-05-02T22:00:00+00:00"));
        let last_run = info.last_run.unwrap();
        assert_eq!(last_run.status, "completed");
        assert_eq!(last_run.triggered_by, "schedule");
    }

    #[tokio::test]
    async fn test_interval_job_runs_immediately_then_after_interval() {
        let (mut scheduler, _handle, clock, _token) = create_test_scheduler();
        let job = TestJob::new("interval_job", JobSchedule::Interval(Duration::from_secs(3600)));
        let count = job.execution_count.clone();
        scheduler.register_job(Arc::new(job)).await;

        scheduler.run_due_jobs().await;
        scheduler.join_running_jobs().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::minutes(30));
        scheduler.run_due_jobs().await;
        scheduler.join_running_jobs().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::minutes(31));
        scheduler.run_due_jobs().await;
        scheduler.join_running_jobs().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_job_records_error() {
        let (mut scheduler, handle, _clock, _token) = create_test_scheduler();
        let job = TestJob::new("failing_job", JobSchedule::Hook(HookEvent::OnStartup));
        job.should_fail.store(true, Ordering::SeqCst);
        let count = job.execution_count.clone();
        scheduler.register_job(Arc::new(job)).await;

        scheduler.fire_hook(HookEvent::OnStartup).await;
        scheduler.join_running_jobs().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let last_run = handle.get_job("failing_job").await.unwrap().last_run.unwrap();
        assert_eq!(last_run.status, "failed");
        assert_eq!(last_run.triggered_by, "hook:OnStartup");
        assert!(last_run.error_message.unwrap().contains("Test failure"));
        assert!(!handle.is_job_running("failing_job").await);
    }

    #[tokio::test]
    async fn test_panicking_job_is_contained() {
        let (mut scheduler, handle, _clock, _token) = create_test_scheduler();
        scheduler.register_job(Arc::new(PanickingJob)).await;

        scheduler.fire_hook(HookEvent::OnStartup).await;
        scheduler.join_running_jobs().await;

        let last_run = handle.get_job("panicking_job").await.unwrap().last_run.unwrap();
        assert_eq!(last_run.status, "failed");
        assert!(last_run.error_message.unwrap().contains("panic"));
    }

    #[tokio::test]
    async fn test_job_execution_on_startup_hook() {
        let (mut scheduler, handle, _clock, shutdown_token) = create_test_scheduler();
        let job = TestJob::new("startup_job", JobSchedule::Hook(HookEvent::OnStartup));
        let count = job.execution_count.clone();
        scheduler.register_job(Arc::new(job)).await;

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });

        // Give scheduler time to start and run the startup hook
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let last_run = handle.get_job("startup_job").await.unwrap().last_run.unwrap();
        assert_eq!(last_run.status, "completed");
        assert_eq!(last_run.triggered_by, "hook:OnStartup");

        shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_trigger_job_through_handle() {
        let (mut scheduler, handle, _clock, shutdown_token) = create_test_scheduler();
        let job = midnight_job("cron_job");
        let count = job.execution_count.clone();
        scheduler.register_job(Arc::new(job)).await;

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });

        assert!(matches!(
            handle.trigger_job("nonexistent").await,
            Err(JobError::NotFound)
        ));

        handle.trigger_job("cron_job").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let last_run = handle.get_job("cron_job").await.unwrap().last_run.unwrap();
        assert_eq!(last_run.triggered_by, "manual");

        shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_running_job_cannot_be_triggered_twice() {
        let (mut scheduler, handle, _clock, shutdown_token) = create_test_scheduler();
        scheduler.register_job(Arc::new(SlowJob)).await;

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Started by the startup hook and still sleeping
        assert!(handle.is_job_running("slow_job").await);
        assert!(matches!(
            handle.trigger_job("slow_job").await,
            Err(JobError::AlreadyRunning)
        ));

        // Shutdown cancels the job
        shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;

        assert!(!handle.is_job_running("slow_job").await);
        let last_run = handle.get_job("slow_job").await.unwrap().last_run.unwrap();
        assert_eq!(last_run.error_message.as_deref(), Some("Cancelled"));
    }
}
