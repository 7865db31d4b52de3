//! Synchronous one-to-many notification.
//!
//! A [`Notifier`] owns its subscriber list; jobs, progress reporters and pools
//! each carry their own. Handlers run on the thread that produced the value,
//! in subscription order, so they must return quickly. A handler that
//! panics is logged and skipped; the remaining handlers still run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::error::panic_message;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Notifier<T> {
    handlers: Mutex<Vec<Handler<T>>>,
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> std::fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl<T> Notifier<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Returns `self` so calls can be chained.
    pub fn subscribe<F>(&self, handler: F) -> &Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(handler));
        self
    }

    /// Drop every registered handler.
    pub fn unsubscribe_all(&self) -> &Self {
        self.lock().clear();
        self
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every handler with `value` on the calling thread.
    ///
    /// The list is snapshotted first, so a handler may subscribe or
    /// unsubscribe without deadlocking; such changes apply from the next call.
    pub(crate) fn notify_all(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self.lock().clone();
        for (index, handler) in handlers.iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(value))) {
                warn!(
                    subscriber = index,
                    panic = %panic_message(payload.as_ref()),
                    "subscriber panicked"
                );
            }
        }
    }

    // A panicking handler must not disable notifications for everybody else.
    fn lock(&self) -> MutexGuard<'_, Vec<Handler<T>>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send + 'static> Notifier<T> {
    /// Subscribe through a channel instead of a callback.
    ///
    /// Values are cloned into the channel; once the receiver is dropped the
    /// handler becomes a no-op.
    pub fn subscribe_channel(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        self.subscribe(move |value: &T| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(value.clone());
            }
        });
        rx
    }
}
