// SPDX-License-Identifier: GPL-3.0-only

//! Execution contexts for platform callbacks and observer delivery
//!
//! Every callback in this crate runs on an [`Executor`] chosen by whoever
//! registered it:
//!
//! - [`InlineExecutor`]: runs the job on the calling thread
//! - [`ThreadExecutor`]: runs jobs in order on one dedicated, named thread
//! - [`TokioExecutor`]: runs jobs on the blocking pool of a tokio runtime

use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Unit of work submitted to an executor
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs every job immediately on the caller's thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Single dedicated thread draining a job queue in submission order
///
/// The thread exits once the executor is dropped and the queue is drained.
pub struct ThreadExecutor {
    name: String,
    sender: mpsc::UnboundedSender<Job>,
}

impl ThreadExecutor {
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let thread_name = name.clone();
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!(executor = %thread_name, "Job panicked");
                    }
                }
                debug!(executor = %thread_name, "Executor thread finished");
            })?;

        Ok(Self { name, sender })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, job: Job) {
        if self.sender.send(job).is_err() {
            warn!(executor = %self.name, "Executor thread gone, dropping job");
        }
    }
}

impl std::fmt::Debug for ThreadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadExecutor")
            .field("name", &self.name)
            .finish()
    }
}

/// Runs jobs on a tokio runtime's blocking thread pool
///
/// Jobs may run concurrently; wrap in a sequential queue when order matters
/// (the listener fan-out does this for every registration).
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime of the calling task, if there is one
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) {
        // Dropping the JoinHandle detaches the task
        drop(self.handle.spawn_blocking(job));
    }
}

/// Executor selection for configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Run on the thread that produced the event
    Inline,
    /// Run on a dedicated thread
    #[default]
    Thread,
    /// Run on the ambient tokio runtime
    Tokio,
}

impl ExecutorKind {
    /// Create an executor of this kind
    ///
    /// `Tokio` requires being called from within a tokio runtime.
    pub fn build(&self, thread_name: &str) -> std::io::Result<Arc<dyn Executor>> {
        match self {
            ExecutorKind::Inline => Ok(Arc::new(InlineExecutor)),
            ExecutorKind::Thread => Ok(Arc::new(ThreadExecutor::new(thread_name)?)),
            ExecutorKind::Tokio => TokioExecutor::current()
                .map(|executor| Arc::new(executor) as Arc<dyn Executor>)
                .ok_or_else(|| std::io::Error::other("no tokio runtime available")),
        }
    }
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::Inline => write!(f, "inline"),
            ExecutorKind::Thread => write!(f, "thread"),
            ExecutorKind::Tokio => write!(f, "tokio"),
        }
    }
}
