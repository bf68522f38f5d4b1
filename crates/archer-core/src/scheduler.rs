// ── Job scheduler ──
//
// One bounded queue, one worker. Jobs run strictly one after another so
// tenant POSTs never interleave; a full queue makes submitters wait.
// Two timers feed the queue with the periodic pending sync and the daily
// cleanup sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use strum::{AsRefStr, Display};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::context::AgentContext;
use crate::error::{CoreError, Result};
use crate::{reconcile, sweep};

// ── Jobs ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Catch-up scan for rows missed by notifications.
    PendingSync,
    /// Orphan sweep.
    Cleanup,
    /// Reconcile every service of the host.
    SyncServices,
    /// Reconcile the destination network of one endpoint.
    SyncEndpoint(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    PendingSync,
    Cleanup,
    SyncServices,
    SyncEndpoint,
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::PendingSync => JobKind::PendingSync,
            Self::Cleanup => JobKind::Cleanup,
            Self::SyncServices => JobKind::SyncServices,
            Self::SyncEndpoint(_) => JobKind::SyncEndpoint,
        }
    }

    pub fn endpoint_id(&self) -> Option<Uuid> {
        match self {
            Self::SyncEndpoint(id) => Some(*id),
            _ => None,
        }
    }
}

/// Executes jobs taken off the queue.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: &Job) -> Result<()>;
}

/// Runs jobs against the agent context.
pub struct AgentRunner {
    ctx: Arc<AgentContext>,
}

impl AgentRunner {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobRunner for AgentRunner {
    async fn run(&self, job: &Job) -> Result<()> {
        match job {
            Job::PendingSync => reconcile::pending_sync(&self.ctx).await,
            Job::Cleanup => sweep::run(&self.ctx).await.map(drop),
            Job::SyncServices => reconcile::sync_services(&self.ctx).await.map(drop),
            Job::SyncEndpoint(id) => reconcile::sync_endpoint(&self.ctx, *id).await.map(drop),
        }
    }
}

// ── Statistics ───────────────────────────────────────────────────────

/// Counters for one job kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindStats {
    pub runs: u64,
    pub failures: u64,
    pub last_duration: Option<Duration>,
    pub last_error: Option<String>,
    pub last_finished: Option<DateTime<Utc>>,
}

impl KindStats {
    /// `Some(true)` if the last run succeeded, `None` before the first run.
    pub fn last_ok(&self) -> Option<bool> {
        (self.runs > 0).then(|| self.last_error.is_none())
    }
}

#[derive(Debug, Default)]
pub struct JobStats {
    kinds: DashMap<JobKind, KindStats>,
}

impl JobStats {
    fn record(&self, kind: JobKind, elapsed: Duration, result: &Result<()>) {
        let mut entry = self.kinds.entry(kind).or_default();
        entry.runs += 1;
        entry.last_duration = Some(elapsed);
        entry.last_finished = Some(Utc::now());
        match result {
            Ok(()) => entry.last_error = None,
            Err(e) => {
                entry.failures += 1;
                entry.last_error = Some(e.to_string());
            }
        }
    }

    pub fn get(&self, kind: JobKind) -> KindStats {
        self.kinds
            .get(&kind)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn total_runs(&self) -> u64 {
        self.kinds.iter().map(|s| s.runs).sum()
    }
}

// ── Scheduler ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub queue_size: usize,
    pub pending_sync_interval: Duration,
    pub cleanup_interval: Duration,
}

impl From<&AgentConfig> for SchedulerConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            queue_size: config.job_queue_size,
            pending_sync_interval: config.pending_sync_interval,
            cleanup_interval: config.cleanup_interval,
        }
    }
}

/// Cloneable handle for submitting jobs.
#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::Sender<Job>,
}

impl JobSender {
    /// Queue a job, waiting while the queue is full. Fails only once the
    /// scheduler has stopped.
    pub async fn submit(&self, job: Job) -> Result<()> {
        debug!(job = %job.kind(), endpoint_id = ?job.endpoint_id(), "job queued");
        self.tx.send(job).await.map_err(|_| CoreError::Shutdown)
    }
}

pub struct Scheduler {
    sender: JobSender,
    stats: Arc<JobStats>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    timers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the worker and both timers. Must be called inside a runtime.
    pub fn start(
        runner: Arc<dyn JobRunner>,
        config: &SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let sender = JobSender { tx };
        let stats = Arc::new(JobStats::default());

        let worker = tokio::spawn(worker_task(
            runner,
            rx,
            Arc::clone(&stats),
            cancel.clone(),
        ));
        let timers = vec![
            tokio::spawn(timer_task(
                sender.clone(),
                Job::PendingSync,
                config.pending_sync_interval,
                cancel.clone(),
            )),
            tokio::spawn(timer_task(
                sender.clone(),
                Job::Cleanup,
                config.cleanup_interval,
                cancel.clone(),
            )),
        ];

        Self {
            sender,
            stats,
            cancel,
            worker,
            timers,
        }
    }

    pub fn sender(&self) -> JobSender {
        self.sender.clone()
    }

    pub fn stats(&self) -> Arc<JobStats> {
        Arc::clone(&self.stats)
    }

    /// Stop accepting work and wait up to `timeout` for the in-flight job,
    /// which is aborted once the timeout expires.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.cancel.cancel();
        for timer in &self.timers {
            timer.abort();
        }
        let worker = self.worker.abort_handle();
        match tokio::time::timeout(timeout, self.worker).await {
            Ok(Ok(())) => {
                info!("scheduler stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(CoreError::Internal(format!("scheduler worker failed: {e}"))),
            Err(_) => {
                warn!(?timeout, "in-flight job did not finish before shutdown timeout, aborting it");
                worker.abort();
                Err(CoreError::Shutdown)
            }
        }
    }
}

async fn worker_task(
    runner: Arc<dyn JobRunner>,
    mut rx: mpsc::Receiver<Job>,
    stats: Arc<JobStats>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = rx.recv() => {
                let Some(job) = job else { break };
                run_job(runner.as_ref(), &job, &stats).await;
            }
        }
    }
    debug!("scheduler worker exited");
}

async fn run_job(runner: &dyn JobRunner, job: &Job, stats: &JobStats) {
    let kind = job.kind();
    let endpoint_id = job.endpoint_id();
    debug!(job = %kind, ?endpoint_id, "job started");

    let started = Instant::now();
    let result = runner.run(job).await;
    let elapsed = started.elapsed();
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    match &result {
        Ok(()) => info!(job = %kind, ?endpoint_id, elapsed_ms, "job finished"),
        Err(e) => error!(job = %kind, ?endpoint_id, elapsed_ms, error = %e, "job failed"),
    }
    stats.record(kind, elapsed, &result);
}

async fn timer_task(sender: JobSender, job: Job, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if sender.submit(job.clone()).await.is_err() {
                    break;
                }
            }
        }
    }
}
