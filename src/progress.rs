//! Fine-grained step reporting for long-running work.
//!
//! A [`Progress`] counts steps towards a fixed maximum and broadcasts a
//! [`ProgressSnapshot`] on every step. Running code only ever sees the
//! write side, a [`ProgressSource`]. This channel is independent of a job's
//! coarse [`Status`](crate::Status): a job may use either, both or neither.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::notifier::Notifier;

/// Point-in-time view of a [`Progress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub max_steps: u32,
    pub steps: u32,
    pub eta: Option<Duration>,
    pub status: Option<String>,
}

impl ProgressSnapshot {
    /// Completion in percent, 0..=100.
    pub fn percent(&self) -> u8 {
        // steps <= max_steps and max_steps >= 1
        ((u64::from(self.steps) * 100) / u64::from(self.max_steps)) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.steps >= self.max_steps
    }
}

struct Inner {
    state: Mutex<ProgressSnapshot>,
    subscribers: Notifier<ProgressSnapshot>,
}

/// Step counter with its own subscriber list. Cloning shares the counter.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Progress").field(&self.snapshot()).finish()
    }
}

impl Progress {
    /// Create a counter with `max_steps` (values below 1 are clamped to 1).
    pub fn new(max_steps: u32) -> Self {
        Self::with_initial(max_steps, None, None)
    }

    pub fn with_initial(max_steps: u32, status: Option<String>, eta: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ProgressSnapshot {
                    max_steps: max_steps.max(1),
                    steps: 0,
                    eta,
                    status,
                }),
                subscribers: Notifier::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().clone()
    }

    pub fn max_steps(&self) -> u32 {
        self.lock().max_steps
    }

    pub fn steps(&self) -> u32 {
        self.lock().steps
    }

    pub fn subscribe<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(handler);
        self
    }

    pub fn unsubscribe_all(&self) -> &Self {
        self.inner.subscribers.unsubscribe_all();
        self
    }

    /// Channel-based subscription.
    pub fn subscribe_channel(&self) -> std::sync::mpsc::Receiver<ProgressSnapshot> {
        self.inner.subscribers.subscribe_channel()
    }

    /// Write-only handle for the code doing the work.
    pub fn source(&self) -> ProgressSource {
        ProgressSource {
            target: Some(self.clone()),
        }
    }

    fn step(&self, status: Option<String>, eta: Option<Duration>) {
        let snapshot = {
            let mut state = self.lock();
            if state.steps < state.max_steps {
                state.steps += 1;
            }
            state.status = status;
            state.eta = eta;
            state.clone()
        };
        self.inner.subscribers.notify_all(&snapshot);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressSnapshot> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The write side of a [`Progress`]. The default source discards every step.
#[derive(Clone, Default)]
pub struct ProgressSource {
    target: Option<Progress>,
}

impl std::fmt::Debug for ProgressSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSource")
            .field("noop", &self.target.is_none())
            .finish()
    }
}

impl ProgressSource {
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.target.is_none()
    }

    /// Advance one step, replacing the status text and ETA, and notify
    /// subscribers with the updated snapshot. Steps past the maximum only
    /// update text and ETA.
    pub fn step(&self, status: Option<&str>, eta: Option<Duration>) {
        if let Some(progress) = &self.target {
            progress.step(status.map(str::to_string), eta);
        }
    }
}
