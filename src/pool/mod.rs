//! Bounded pool of workers over a shared FIFO queue.
//!
//! [`ExecutionPool::execute`] wraps a function into a [`Job`] and queues it,
//! which wakes every worker attached to the queue, including those of pools
//! made with [`ExecutionPool::create_new`]. Each worker is a dedicated OS
//! thread (see [`Worker`]).
//! The pool broadcasts a [`SlotEvent`] whenever a slot picks up or finishes a
//! job, so observers can track occupancy without polling.
//!
//! Jobs are dequeued in submission order; completion order depends on how
//! long each job runs.

mod queue;
mod signal;
mod worker;

pub use queue::{JobQueue, QueuedJob};
pub use worker::{JobHook, SlotHook, Worker, WorkerOptions};

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::notifier::Notifier;
use crate::state_machine::{Job, JobContext, JobSettings, JobSummary, Status};

/// Occupancy change of one worker slot: `job` is `Some` when the slot picks
/// up a job and `None` when it finishes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotEvent {
    pub slot: usize,
    pub job: Option<JobSummary>,
}

struct Slots {
    events: Notifier<SlotEvent>,
    occupancy: Mutex<Vec<Option<JobSummary>>>,
}

impl Slots {
    fn update(&self, slot: usize, job: Option<JobSummary>) {
        {
            let mut occupancy = self.lock();
            if let Some(entry) = occupancy.get_mut(slot) {
                *entry = job.clone();
            }
        }
        self.events.notify_all(&SlotEvent { slot, job });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<JobSummary>>> {
        self.occupancy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ExecutionPool {
    size: usize,
    thread_name: String,
    queue: JobQueue,
    workers: Mutex<Vec<Worker>>,
    slots: Arc<Slots>,
}

impl std::fmt::Debug for ExecutionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPool")
            .field("size", &self.size)
            .field("queued", &self.queue.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl ExecutionPool {
    /// Create an idle pool of `size` slots. A size of 0 becomes 1.
    pub fn new(size: usize) -> Self {
        Self::with_queue(size, JobQueue::new(), default_thread_name())
    }

    /// One slot per available hardware thread.
    pub fn with_default_size() -> Self {
        Self::new(default_size())
    }

    /// Build a pool from configuration, starting it when `autostart` is set.
    pub fn from_config(config: &PoolConfig) -> Result<Self, PoolError> {
        let size = match config.size {
            Some(size) => usize::try_from(size).unwrap_or(0),
            None => default_size(),
        };
        let pool = Self::with_queue(size, JobQueue::new(), config.thread_name.clone());
        if config.autostart {
            pool.start()?;
        }
        Ok(pool)
    }

    fn with_queue(size: usize, queue: JobQueue, thread_name: String) -> Self {
        if size == 0 {
            debug!("pool size 0 normalized to 1");
        }
        let size = size.max(1);
        let slots = Slots {
            events: Notifier::new(),
            occupancy: Mutex::new(vec![None; size]),
        };
        Self {
            size,
            thread_name,
            queue,
            workers: Mutex::new(Vec::new()),
            slots: Arc::new(slots),
        }
    }

    /// A new, idle pool of `size` slots over this pool's queue. Jobs queued
    /// through either pool can be run by the workers of either.
    pub fn create_new(&self, size: usize) -> Self {
        Self::with_queue(size, self.queue.clone(), self.thread_name.clone())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_running(&self) -> bool {
        !self.lock_workers().is_empty()
    }

    /// Spawn one worker per slot. Calling it on a running pool does nothing.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut workers = self.lock_workers();
        if !workers.is_empty() {
            return Ok(());
        }

        for slot in 0..self.size {
            let started = Arc::clone(&self.slots);
            let finished = Arc::clone(&self.slots);
            let options = WorkerOptions::default()
                .thread_name(self.thread_name.clone())
                .on_job_started(move |slot, job| started.update(slot, Some(job.clone())))
                .on_job_finished(move |slot, _| finished.update(slot, None));
            workers.push(Worker::spawn(slot, self.queue.clone(), options)?);
        }

        info!(size = self.size, queued = self.queue.len(), "pool started");
        Ok(())
    }

    /// Queue `work` as a new job and wake the workers. Returns immediately.
    pub fn execute<T, F>(&self, settings: JobSettings, work: F) -> Arc<Job<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&JobContext<'_>) -> anyhow::Result<T> + Send + 'static,
    {
        self.submit(Arc::new(Job::new(settings, work)))
    }

    /// Like [`execute`](Self::execute), with `on_status` subscribed to the job
    /// before it becomes visible to any worker.
    pub fn execute_with_callback<T, F, C>(
        &self,
        settings: JobSettings,
        work: F,
        on_status: C,
    ) -> Arc<Job<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&JobContext<'_>) -> anyhow::Result<T> + Send + 'static,
        C: Fn(&Status<T>) + Send + Sync + 'static,
    {
        let job = Arc::new(Job::new(settings, work));
        job.subscribe(on_status);
        self.submit(job)
    }

    /// Queue an existing job. Every worker on the queue is woken, whichever
    /// pool it belongs to.
    pub fn submit<T>(&self, job: Arc<Job<T>>) -> Arc<Job<T>>
    where
        T: Clone + Send + 'static,
    {
        debug!(job_id = %job.id(), name = ?job.name(), "job queued");
        self.queue.push(job.clone());
        job
    }

    pub fn subscribe<F>(&self, handler: F) -> &Self
    where
        F: Fn(&SlotEvent) + Send + Sync + 'static,
    {
        self.slots.events.subscribe(handler);
        self
    }

    pub fn unsubscribe_all(&self) -> &Self {
        self.slots.events.unsubscribe_all();
        self
    }

    pub fn subscribe_channel(&self) -> std::sync::mpsc::Receiver<SlotEvent> {
        self.slots.events.subscribe_channel()
    }

    /// The job each slot is running right now.
    pub fn occupancy(&self) -> Vec<Option<JobSummary>> {
        self.slots.lock().clone()
    }

    /// Ask every worker to stop after its current job. Queued jobs stay queued.
    pub fn request_stop(&self) {
        for worker in self.lock_workers().iter() {
            worker.request_stop();
        }
    }

    /// Stop every worker and resolve once all loops have exited. The pool can
    /// be started again afterwards.
    pub async fn stop_and_wait(&self) {
        let workers = std::mem::take(&mut *self.lock_workers());
        for worker in &workers {
            worker.request_stop();
        }
        let exits: Vec<_> = workers.iter().map(Worker::stopped).collect();
        for exit in exits {
            exit.await;
        }
        for worker in &workers {
            worker.join();
        }
        info!(size = self.size, queued = self.queue.len(), "pool stopped");
    }

    /// Blocking counterpart of [`stop_and_wait`](Self::stop_and_wait).
    pub fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.lock_workers());
        for worker in &workers {
            worker.request_stop();
        }
        for worker in &workers {
            worker.join();
        }
        info!(size = self.size, queued = self.queue.len(), "pool stopped");
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<Worker>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ExecutionPool {
    fn default() -> Self {
        Self::with_default_size()
    }
}

/// Available hardware concurrency, or 1 when it cannot be determined.
pub fn default_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_thread_name() -> String {
    PoolConfig::default().thread_name
}
