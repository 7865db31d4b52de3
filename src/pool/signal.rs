use std::sync::{Condvar, Mutex, MutexGuard};
#[cfg(test)]
use std::time::Duration;

/// Manual-reset event: once set, every waiter passes until `reset`.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        *self.lock() = true;
        self.cond.notify_all();
    }

    pub(crate) fn reset(&self) {
        *self.lock() = false;
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.lock()
    }

    pub(crate) fn wait(&self) {
        let guard = self.lock();
        let _guard = self
            .cond
            .wait_while(guard, |set| !*set)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }

    /// Returns whether the signal was set before `timeout` elapsed.
    #[cfg(test)]
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |set| !*set)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
