//! One concurrency slot: a dedicated thread draining the shared queue.
//!
//! The loop alternates between two phases:
//!
//! - drain: pop and execute jobs until the queue is empty or a stop is
//!   requested;
//! - pause: block on the wake signal until new work arrives or a stop is
//!   requested.
//!
//! The wake signal is attached to the queue. It is reset *before* each drain
//! attempt and [`JobQueue::push`] sets it *after* publishing a job, so a job
//! pushed while the worker is between "queue looked empty" and "start
//! waiting" still wakes it.
//!
//! Hooks run inside `catch_unwind`: a panicking hook is logged and the loop
//! carries on.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::queue::{JobQueue, QueuedJob};
use super::signal::Signal;
use crate::error::{PoolError, panic_message};
use crate::state_machine::JobSummary;

pub type SlotHook = Arc<dyn Fn(usize) + Send + Sync>;
pub type JobHook = Arc<dyn Fn(usize, &JobSummary) + Send + Sync>;

/// Optional behaviour for a [`Worker`]. Hooks run on the worker thread.
#[derive(Clone, Default)]
pub struct WorkerOptions {
    /// Wait for [`Worker::start`] before touching the queue.
    pub manual_start: bool,
    pub thread_name: Option<String>,
    pub on_paused: Option<SlotHook>,
    pub on_stopped: Option<SlotHook>,
    pub on_job_started: Option<JobHook>,
    pub on_job_finished: Option<JobHook>,
}

impl WorkerOptions {
    pub fn manual_start(mut self) -> Self {
        self.manual_start = true;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    pub fn on_paused(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_paused = Some(Arc::new(hook));
        self
    }

    pub fn on_stopped(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_stopped = Some(Arc::new(hook));
        self
    }

    pub fn on_job_started(
        mut self,
        hook: impl Fn(usize, &JobSummary) + Send + Sync + 'static,
    ) -> Self {
        self.on_job_started = Some(Arc::new(hook));
        self
    }

    pub fn on_job_finished(
        mut self,
        hook: impl Fn(usize, &JobSummary) + Send + Sync + 'static,
    ) -> Self {
        self.on_job_finished = Some(Arc::new(hook));
        self
    }
}

struct Shared {
    slot: usize,
    queue: JobQueue,
    wake: Arc<Signal>,
    start_gate: Signal,
    stop_requested: AtomicBool,
}

impl Shared {
    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

pub struct Worker {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stopped: watch::Receiver<bool>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("slot", &self.shared.slot)
            .field("woken", &self.shared.wake.is_set())
            .field("stop_requested", &self.shared.stop_requested())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Worker {
    /// Spawn the worker thread for `slot`, consuming from `queue`.
    pub fn spawn(slot: usize, queue: JobQueue, options: WorkerOptions) -> Result<Self, PoolError> {
        let wake = Arc::new(Signal::new());
        queue.attach(&wake);
        let shared = Arc::new(Shared {
            slot,
            queue,
            wake,
            start_gate: Signal::new(),
            stop_requested: AtomicBool::new(false),
        });
        let (stopped_tx, stopped) = watch::channel(false);

        let name = options
            .thread_name
            .clone()
            .unwrap_or_else(|| "jobpool-worker".to_string());
        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("{name}-{slot}"))
            .spawn(move || {
                run_loop(&loop_shared, &options);
                stopped_tx.send_replace(true);
            })?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
            stopped,
        })
    }

    pub fn slot(&self) -> usize {
        self.shared.slot
    }

    /// Open the start gate of a manually started worker. No effect otherwise.
    pub fn start(&self) {
        self.shared.start_gate.set();
    }

    /// Wake the worker so it re-checks the queue.
    pub fn notify(&self) {
        self.shared.wake.set();
    }

    /// Ask the loop to exit after the job it is running, if any.
    pub fn request_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        // A worker still waiting for its start must be able to observe the stop.
        self.shared.start_gate.set();
        self.shared.wake.set();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }

    /// True once the loop has exited.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Resolves once the loop has exited. Does not request a stop by itself.
    pub fn stopped(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.stopped.clone();
        async move {
            // A closed channel means the thread is gone as well.
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }

    /// Block until the worker thread has exited.
    pub fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!(slot = self.shared.slot, "worker thread panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.request_stop();
    }
}

fn run_loop(shared: &Shared, options: &WorkerOptions) {
    let slot = shared.slot;
    if options.manual_start {
        trace!(slot, "waiting for start");
        shared.start_gate.wait();
    }
    debug!(slot, "worker started");

    while !shared.stop_requested() {
        shared.wake.reset();

        while !shared.stop_requested() {
            let Some(job) = shared.queue.try_pop() else {
                break;
            };
            execute(slot, &job, options);
        }

        if shared.stop_requested() {
            break;
        }

        trace!(slot, "queue empty, pausing");
        if let Some(hook) = &options.on_paused {
            guarded(slot, "on_paused", || hook(slot));
        }
        shared.wake.wait();
    }

    if let Some(hook) = &options.on_stopped {
        guarded(slot, "on_stopped", || hook(slot));
    }
    debug!(slot, "worker stopped");
}

fn execute(slot: usize, job: &QueuedJob, options: &WorkerOptions) {
    let summary = job.summary();
    if !job.claim() {
        warn!(slot, job_id = %summary.id, status = %job.kind(), "skipping job that is not ready to run");
        return;
    }

    debug!(slot, job_id = %summary.id, name = ?summary.name, "job picked up");
    if let Some(hook) = &options.on_job_started {
        guarded(slot, "on_job_started", || hook(slot, &summary));
    }

    let started = Instant::now();
    if !job.run() {
        warn!(slot, job_id = %summary.id, "claimed job had nothing to run");
    } else if job.failed() {
        warn!(slot, job_id = %summary.id, duration_ms = started.elapsed().as_millis() as u64, "job failed");
    } else {
        info!(slot, job_id = %summary.id, duration_ms = started.elapsed().as_millis() as u64, "job completed");
    }

    if let Some(hook) = &options.on_job_finished {
        guarded(slot, "on_job_finished", || hook(slot, &summary));
    }
}

fn guarded(slot: usize, hook: &'static str, call: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(call)) {
        warn!(slot, hook, panic = %panic_message(payload.as_ref()), "worker hook panicked");
    }
}
