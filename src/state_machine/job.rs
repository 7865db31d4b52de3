use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::status::{Status, StatusKind, Transition};
use crate::error::JobError;
use crate::notifier::Notifier;
use crate::progress::ProgressSource;

/// Opaque job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-job settings handed to the job function.
///
/// Cancellation is cooperative: neither the job nor the pool ever looks at
/// the token. A job function that wants to stop early must poll it.
#[derive(Debug, Clone, Default)]
pub struct JobSettings {
    pub name: Option<String>,
    pub cancellation: CancellationToken,
    pub progress: ProgressSource,
}

impl JobSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSource) -> Self {
        self.progress = progress;
        self
    }
}

/// What a running job function can see.
pub struct JobContext<'a> {
    settings: &'a JobSettings,
    reporter: &'a (dyn Fn(Option<Duration>, u8) + 'a),
}

impl JobContext<'_> {
    pub fn settings(&self) -> &JobSettings {
        self.settings
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.settings.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.settings.cancellation.is_cancelled()
    }

    pub fn progress(&self) -> &ProgressSource {
        &self.settings.progress
    }

    /// Move the job to `RunningWithProgress`. Percentages above 100 are
    /// clamped; repeating the same percentage does not notify again.
    pub fn report(&self, eta: Option<Duration>, percent: u8) {
        (self.reporter)(eta, percent.min(100));
    }
}

type Work<T> = Box<dyn FnOnce(&JobContext<'_>) -> anyhow::Result<T> + Send>;

struct JobState<T> {
    status: Status<T>,
    history: Vec<StatusKind>,
    finished_at: Option<DateTime<Utc>>,
}

/// A unit of work with an observable [`Status`].
pub struct Job<T> {
    id: JobId,
    settings: JobSettings,
    created_at: DateTime<Utc>,
    work: Mutex<Option<Work<T>>>,
    state: Mutex<JobState<T>>,
    finished: Condvar,
    subscribers: Notifier<Status<T>>,
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.settings.name)
            .field("status", &self.lock_state().status.kind())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Job<T> {
    /// Create a job in `ReadyToRun`.
    pub fn new<F>(settings: JobSettings, work: F) -> Self
    where
        F: FnOnce(&JobContext<'_>) -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            id: JobId::new(),
            settings,
            created_at: Utc::now(),
            work: Mutex::new(Some(Box::new(work))),
            state: Mutex::new(JobState {
                status: Status::ReadyToRun,
                history: vec![StatusKind::ReadyToRun],
                finished_at: None,
            }),
            finished: Condvar::new(),
            subscribers: Notifier::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.settings.name.as_deref()
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().finished_at
    }

    pub fn status(&self) -> Status<T> {
        self.lock_state().status.clone()
    }

    /// Every stored status, oldest first.
    pub fn history(&self) -> Vec<StatusKind> {
        self.lock_state().history.clone()
    }

    pub fn subscribe<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Status<T>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(handler);
        self
    }

    pub fn unsubscribe_all(&self) -> &Self {
        self.subscribers.unsubscribe_all();
        self
    }

    pub fn subscribe_channel(&self) -> std::sync::mpsc::Receiver<Status<T>> {
        self.subscribers.subscribe_channel()
    }

    /// Block until the job is terminal or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Status<T>> {
        let guard = self.lock_state();
        let (guard, _) = self
            .finished
            .wait_timeout_while(guard, timeout, |state| state.status.is_unresolved())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.status.is_done().then(|| guard.status.clone())
    }

    /// Compare-and-notify. Subscribers run on the calling thread after the
    /// new status is stored.
    pub(crate) fn set_status(&self, next: Status<T>) -> Transition {
        {
            let mut state = self.lock_state();
            if state.status == next {
                return Transition::Unchanged;
            }
            if !state.status.allows(&next) {
                return Transition::Rejected;
            }
            self.store(&mut state, next.clone());
        }
        self.subscribers.notify_all(&next);
        Transition::Applied
    }

    /// Move `ReadyToRun` to `Running`. Fails for a job in any other status,
    /// which keeps a job from running twice.
    fn begin(&self) -> bool {
        {
            let mut state = self.lock_state();
            if state.status.kind() != StatusKind::ReadyToRun {
                return false;
            }
            self.store(&mut state, Status::Running);
        }
        self.subscribers.notify_all(&Status::Running);
        true
    }

    /// Run the job function and record its outcome.
    ///
    /// Errors and panics from the function become `failure`; nothing escapes.
    /// Returns `false` without running anything if the job was not
    /// `ReadyToRun`.
    pub fn execute(&self) -> bool {
        if !self.begin() {
            return false;
        }
        if !self.run_claimed() {
            // begin() succeeds once per job, and the function is only taken here.
            self.set_status(Status::Done);
        }
        true
    }

    /// Run the function of a job already moved to `Running`. Returns `false`
    /// if the job is not running or its function was already taken.
    fn run_claimed(&self) -> bool {
        if !self.lock_state().status.is_running() {
            return false;
        }
        let work = self
            .work
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(work) = work else {
            return false;
        };

        let reporter = |eta: Option<Duration>, progress: u8| {
            self.set_status(Status::RunningWithProgress { eta, progress });
        };
        let ctx = JobContext {
            settings: &self.settings,
            reporter: &reporter,
        };

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&ctx)));
        let duration = started.elapsed();

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(JobError::from(err)),
            Err(payload) => Err(JobError::from_panic(payload)),
        };
        self.set_status(Status::DoneWithResult { result, duration });
        true
    }

    fn store(&self, state: &mut JobState<T>, next: Status<T>) {
        state.history.push(next.kind());
        if next.is_done() {
            state.finished_at = Some(Utc::now());
            self.finished.notify_all();
        }
        state.status = next;
    }
}

impl<T> Job<T> {
    fn lock_state(&self) -> MutexGuard<'_, JobState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Identity of a job, without its payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub name: Option<String>,
}

/// Type-erased view of a queued job, as seen by workers.
pub trait Runnable: Send + Sync {
    fn summary(&self) -> JobSummary;
    fn kind(&self) -> StatusKind;
    /// Move a `ReadyToRun` job to `Running`. Only one caller ever wins.
    fn claim(&self) -> bool;
    /// Run a claimed job to completion; `false` if it was not claimed or
    /// already ran.
    fn run(&self) -> bool;
    /// Whether the finished job failed.
    fn failed(&self) -> bool;
}

impl<T: Clone + Send + 'static> Runnable for Job<T> {
    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            name: self.settings.name.clone(),
        }
    }

    fn kind(&self) -> StatusKind {
        self.lock_state().status.kind()
    }

    fn claim(&self) -> bool {
        self.begin()
    }

    fn run(&self) -> bool {
        self.run_claimed()
    }

    fn failed(&self) -> bool {
        matches!(self.lock_state().status.result(), Some(Err(_)))
    }
}

/// Serializable record of a job, typically produced once it has finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub name: Option<String>,
    pub status: StatusKind,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub state_transitions: Vec<StatusKind>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobReport {
    pub fn from_job<T: Clone + Send + 'static>(job: &Job<T>) -> Self {
        let state = job.lock_state();
        let error = match state.status.result() {
            Some(Err(err)) => Some(err.to_string()),
            _ => None,
        };
        Self {
            job_id: job.id,
            name: job.settings.name.clone(),
            status: state.status.kind(),
            error,
            duration_ms: state
                .status
                .duration()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            state_transitions: state.history.clone(),
            created_at: job.created_at,
            finished_at: state.finished_at,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status.is_terminal() && self.error.is_none()
    }
}
