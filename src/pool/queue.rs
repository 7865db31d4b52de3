//! Shared FIFO of jobs waiting for a worker.
//!
//! Workers attach their wake signal to the queue they consume, so a push
//! reaches every worker on the queue, whichever pool spawned it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::signal::Signal;
use crate::state_machine::Runnable;

pub type QueuedJob = Arc<dyn Runnable>;

/// Thread-safe FIFO queue. Clones share the same storage, which is how pools
/// created with [`ExecutionPool::create_new`](crate::ExecutionPool::create_new)
/// see each other's work.
#[derive(Clone, Default)]
pub struct JobQueue {
    items: Arc<Mutex<VecDeque<QueuedJob>>>,
    wakers: Arc<Mutex<Vec<Weak<Signal>>>>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("len", &self.len())
            .field("workers", &self.attached())
            .finish()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job and wake every attached worker. The job is visible to
    /// `try_pop` before any worker is woken.
    pub fn push(&self, job: QueuedJob) {
        self.lock().push_back(job);
        self.wake_all();
    }

    /// Wake every live worker attached to this queue.
    pub fn wake_all(&self) {
        let mut wakers = self.lock_wakers();
        wakers.retain(|waker| match waker.upgrade() {
            Some(signal) => {
                signal.set();
                true
            }
            None => false,
        });
    }

    /// Live workers attached to this queue.
    pub fn attached(&self) -> usize {
        self.lock_wakers()
            .iter()
            .filter(|waker| waker.strong_count() > 0)
            .count()
    }

    pub(crate) fn attach(&self, wake: &Arc<Signal>) {
        let mut wakers = self.lock_wakers();
        wakers.retain(|waker| waker.strong_count() > 0);
        wakers.push(Arc::downgrade(wake));
    }

    /// Take the oldest job, or `None` straight away if the queue is empty.
    pub fn try_pop(&self) -> Option<QueuedJob> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two handles share storage.
    pub fn same_queue(&self, other: &JobQueue) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedJob>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_wakers(&self) -> MutexGuard<'_, Vec<Weak<Signal>>> {
        self.wakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
