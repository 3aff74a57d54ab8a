//! Job lifecycle supervisor.
//!
//! Starts relay pipelines, tracks them in the [`JobRegistry`], stops them with
//! a SIGTERM → grace period → SIGKILL sequence, and reaps them when they exit
//! on their own. Every registry change is published to the [`Notifier`].
//!
//! Explicit stop and the per-job exit monitor both remove through
//! [`JobRegistry::remove_if`], so a job is removed (and announced) once no
//! matter which path gets there first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::job::{Job, JobSnapshot, StartRequest};
use crate::notify::Notifier;
use crate::process::{PipelineConfig, ProcessHandle, ProcessWaiter, Signal, describe_exit};
use crate::registry::JobRegistry;

/// Default wait between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// How long to wait for a SIGKILLed group before giving up on observing its exit.
const KILL_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How pipelines are launched.
    pub pipeline: PipelineConfig,
    /// Wait between the graceful and forceful signals on stop.
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The pipeline had already exited; no signal was sent.
    AlreadyExited,
    /// The pipeline exited within the grace period after SIGTERM.
    Terminated,
    /// The pipeline outlived the grace period and was SIGKILLed.
    Killed,
    /// Another stop was already in progress for this job.
    InProgress,
}

/// Supervises relay jobs. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    registry: JobRegistry,
    config: SupervisorConfig,
    notifier: Arc<dyn Notifier>,
    /// Orders publishes so updates go out in the order their lists were taken.
    publish_lock: Mutex<()>,
}

impl Inner {
    async fn publish(&self) {
        let _guard = self.publish_lock.lock().await;
        let streams = self.registry.list().await;
        self.notifier.publish(streams);
    }
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: JobRegistry::new(),
                config,
                notifier,
                publish_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Start relaying `request.url` to its target.
    ///
    /// Duplicate keys are rejected with [`Error::AlreadyExists`]; a running
    /// job is never replaced. The job is registered before this returns.
    pub async fn start(&self, request: &StartRequest) -> Result<JobSnapshot> {
        request.validate()?;

        let key = request.url.as_str();
        if self.inner.registry.contains(key).await {
            return Err(Error::AlreadyExists(key.to_string()));
        }

        let target = request.target();
        let (handle, waiter) = ProcessHandle::spawn(&self.inner.config.pipeline, key, &target)?;
        let job = Arc::new(Job::new(key, target, handle));

        if let Err(e) = self.inner.registry.insert(job.clone()).await {
            // A concurrent start registered the key first; don't leak our group.
            tracing::warn!(
                "Discarding duplicate relay for {} (pid {}): {}",
                key,
                job.pid(),
                e
            );
            if let Err(err) = job.handle().signal(Signal::Kill) {
                tracing::warn!("{}", err);
            }
            tokio::spawn(waiter.wait());
            return Err(e);
        }

        tracing::info!("Started relay for {} (pid {})", key, job.pid());

        tokio::spawn(monitor(self.inner.clone(), job.clone(), waiter));
        self.inner.publish().await;

        Ok(job.snapshot())
    }

    /// Stop the job registered under `key`.
    ///
    /// Sends SIGTERM to the process group, waits up to the grace period for
    /// the pipeline to exit, then sends SIGKILL if it is still alive. The job
    /// is removed from the registry whether or not the signals were delivered.
    pub async fn stop(&self, key: &str) -> Result<StopOutcome> {
        let job = self.inner.registry.get(key).await?;
        let handle = job.handle();
        let grace = self.inner.config.grace_period;

        if !job.begin_stop() {
            tracing::debug!("Stop already in progress for {}", key);
            handle.wait_exit_timeout(grace + KILL_SETTLE_TIMEOUT).await;
            return Ok(StopOutcome::InProgress);
        }

        let outcome = if handle.has_exited() {
            StopOutcome::AlreadyExited
        } else {
            tracing::info!("Stopping relay for {} (pid {})", key, job.pid());
            if let Err(e) = handle.signal(Signal::Terminate) {
                tracing::warn!("{}", e);
            }

            if handle.wait_exit_timeout(grace).await {
                StopOutcome::Terminated
            } else {
                tracing::warn!(
                    "Relay for {} still running {}ms after SIGTERM, sending SIGKILL",
                    key,
                    grace.as_millis()
                );
                if let Err(e) = handle.signal(Signal::Kill) {
                    tracing::warn!("{}", e);
                }
                if !handle.wait_exit_timeout(KILL_SETTLE_TIMEOUT).await {
                    tracing::error!("Relay for {} (pid {}) did not exit after SIGKILL", key, job.pid());
                }
                StopOutcome::Killed
            }
        };

        if self.inner.registry.remove_if(key, job.id()).await.is_some() {
            self.inner.publish().await;
        }

        Ok(outcome)
    }

    /// Current view of the job under `key`.
    pub async fn status(&self, key: &str) -> Result<JobSnapshot> {
        self.inner.registry.get(key).await.map(|job| job.snapshot())
    }

    /// Snapshot of every registered job.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        self.inner.registry.list().await
    }

    /// Stop every registered job concurrently. Returns how many were stopped.
    pub async fn shutdown(&self) -> usize {
        let mut stops = JoinSet::new();
        for job in self.inner.registry.jobs().await {
            let supervisor = self.clone();
            let key = job.key().to_string();
            stops.spawn(async move { supervisor.stop(&key).await });
        }

        let mut stopped = 0;
        while let Some(result) = stops.join_next().await {
            match result {
                Ok(Ok(_)) => stopped += 1,
                // Reaped by its monitor between listing and stopping.
                Ok(Err(Error::NotFound(_))) => {}
                Ok(Err(e)) => tracing::warn!("Failed to stop relay during shutdown: {}", e),
                Err(e) => tracing::error!("Stop task failed: {}", e),
            }
        }
        stopped
    }
}

/// Wait for the pipeline to exit, then reap its job.
async fn monitor(inner: Arc<Inner>, job: Arc<Job>, waiter: ProcessWaiter) {
    match waiter.wait().await {
        Ok(status) if status.success() || job.is_stopping() => {
            tracing::info!(
                "Relay for {} (pid {}) exited: {}",
                job.key(),
                job.pid(),
                describe_exit(&status)
            );
        }
        Ok(status) => {
            tracing::warn!(
                "Relay for {} (pid {}) exited unexpectedly: {}",
                job.key(),
                job.pid(),
                describe_exit(&status)
            );
        }
        Err(e) => {
            tracing::error!("Failed to wait for relay {} (pid {}): {}", job.key(), job.pid(), e);
        }
    }

    if inner.registry.remove_if(job.key(), job.id()).await.is_some() {
        tracing::debug!("Reaped relay for {}", job.key());
        inner.publish().await;
    }
}
