//! In-process job execution engine.
//!
//! An [`ExecutionPool`] runs up to N jobs at once on dedicated worker
//! threads, pulling them from a shared FIFO queue. Every [`Job`] carries an
//! observable [`Status`]:
//!
//! ```text
//! READY_TO_RUN → RUNNING → RUNNING_WITH_PROGRESS* → DONE_WITH_RESULT
//! ```
//!
//! Errors and panics raised by a job function are captured into the final
//! status and never reach the worker. Finer-grained reporting is available
//! through [`Progress`], independent of the job status.
//!
//! ```no_run
//! use jobpool::{ExecutionPool, JobSettings};
//!
//! let pool = ExecutionPool::new(2);
//! pool.start()?;
//! let job = pool.execute(JobSettings::named("answer"), |ctx| {
//!     ctx.report(None, 50);
//!     Ok(42)
//! });
//! job.wait_timeout(std::time::Duration::from_secs(1));
//! pool.shutdown();
//! # Ok::<(), jobpool::PoolError>(())
//! ```
//!
//! Cancellation is cooperative only: the token in [`JobSettings`] is handed
//! to the job function, and nothing in the pool checks or enforces it.

pub mod config;
pub mod error;
pub mod notifier;
pub mod pool;
pub mod progress;
pub mod state_machine;
pub mod telemetry;
pub mod ui;

pub use config::PoolConfig;
pub use error::{JobError, JobResult, PoolError};
pub use notifier::Notifier;
pub use pool::{ExecutionPool, JobQueue, SlotEvent, Worker, WorkerOptions};
pub use progress::{Progress, ProgressSnapshot, ProgressSource};
pub use state_machine::{
    Job, JobContext, JobId, JobReport, JobSettings, JobSummary, Runnable, Status, StatusKind,
    Transition,
};
pub use tokio_util::sync::CancellationToken;
