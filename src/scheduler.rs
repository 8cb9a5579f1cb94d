// SPDX-License-Identifier: GPL-3.0-only

//! Delayed job scheduling for automatic open retries

use crate::executor::Job;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Runs a job once a delay has elapsed
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, job: Job);
}

/// Sleeps on a short-lived named thread per job
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, job: Job) {
        let spawned = std::thread::Builder::new()
            .name("camera-retry".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                job();
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn retry thread");
        }
    }
}

/// Uses a tokio runtime timer, then runs the job on the blocking pool
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, job: Job) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                warn!(error = %e, "Scheduled job failed");
            }
        });
    }
}

/// Holds jobs until the owner runs them; time never passes on its own
///
/// Used for deterministic tests and scripted scenarios.
#[derive(Default)]
pub struct ManualScheduler {
    jobs: Mutex<Vec<(Duration, Job)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to run
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Delays of the waiting jobs, in scheduling order
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(delay, _)| *delay)
            .collect()
    }

    /// Run every waiting job in scheduling order, returning how many ran
    ///
    /// Jobs scheduled while running are kept for the next call.
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.jobs.lock().unwrap_or_else(PoisonError::into_inner));
        let count = jobs.len();
        for (delay, job) in jobs {
            debug!(?delay, "Running scheduled job");
            job();
        }
        count
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, job: Job) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((delay, job));
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
