use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JobResult;

/// Lifecycle of a job.
///
/// A job flows through: READY_TO_RUN → RUNNING → RUNNING_WITH_PROGRESS* → DONE
///
/// `RunningWithProgress` may repeat or be skipped entirely. `Done` and
/// `DoneWithResult` are terminal.
#[derive(Debug, Clone)]
pub enum Status<T> {
    ReadyToRun,
    Running,
    RunningWithProgress {
        eta: Option<Duration>,
        /// Percent complete, 0..=100.
        progress: u8,
    },
    /// Finished without a captured result.
    Done,
    DoneWithResult {
        result: JobResult<T>,
        /// Wall-clock time spent inside the job function.
        duration: Duration,
    },
}

// Equality drives compare-and-notify: progress updates compare by percentage
// only (ETA ignored), and two `DoneWithResult` values are never equal.
impl<T> PartialEq for Status<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Status::ReadyToRun, Status::ReadyToRun)
            | (Status::Running, Status::Running)
            | (Status::Done, Status::Done) => true,
            (
                Status::RunningWithProgress { progress: a, .. },
                Status::RunningWithProgress { progress: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

impl<T> Status<T> {
    pub fn kind(&self) -> StatusKind {
        match self {
            Status::ReadyToRun => StatusKind::ReadyToRun,
            Status::Running => StatusKind::Running,
            Status::RunningWithProgress { .. } => StatusKind::RunningWithProgress,
            Status::Done => StatusKind::Done,
            Status::DoneWithResult { .. } => StatusKind::DoneWithResult,
        }
    }

    /// True only for `Done` and `DoneWithResult`. A progress of 100% is
    /// informational and does not make a job done.
    pub fn is_done(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Not yet terminal.
    pub fn is_unresolved(&self) -> bool {
        !self.is_done()
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running | Status::RunningWithProgress { .. })
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            Status::RunningWithProgress { progress, .. } => Some(*progress),
            _ => None,
        }
    }

    pub fn eta(&self) -> Option<Duration> {
        match self {
            Status::RunningWithProgress { eta, .. } => *eta,
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&JobResult<T>> {
        match self {
            Status::DoneWithResult { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Status::DoneWithResult { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    ///
    /// - Terminal statuses never transition again.
    /// - Otherwise the target must not rank below the current status.
    pub fn allows(&self, next: &Status<T>) -> bool {
        if self.is_done() {
            return false;
        }
        next.kind().rank() >= self.kind().rank()
    }
}

/// Payload-free discriminant of a [`Status`], used for history and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    ReadyToRun,
    Running,
    RunningWithProgress,
    Done,
    DoneWithResult,
}

impl StatusKind {
    /// Position in the lifecycle order. Both done variants share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            StatusKind::ReadyToRun => 0,
            StatusKind::Running => 1,
            StatusKind::RunningWithProgress => 2,
            StatusKind::Done | StatusKind::DoneWithResult => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StatusKind::Done | StatusKind::DoneWithResult)
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::ReadyToRun => write!(f, "READY_TO_RUN"),
            StatusKind::Running => write!(f, "RUNNING"),
            StatusKind::RunningWithProgress => write!(f, "RUNNING_WITH_PROGRESS"),
            StatusKind::Done => write!(f, "DONE"),
            StatusKind::DoneWithResult => write!(f, "DONE_WITH_RESULT"),
        }
    }
}

/// Outcome of a requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The new status was stored and subscribers were notified.
    Applied,
    /// The new status equals the current one; nothing happened.
    Unchanged,
    /// The change would break the lifecycle order and was ignored.
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;

    fn progress(eta_secs: u64, progress: u8) -> Status<String> {
        Status::RunningWithProgress {
            eta: Some(Duration::from_secs(eta_secs)),
            progress,
        }
    }

    fn finished() -> Status<String> {
        Status::DoneWithResult {
            result: Ok("A".into()),
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn progress_equality_ignores_eta() {
        assert_eq!(progress(10, 40), progress(99, 40));
        assert_ne!(progress(10, 40), progress(10, 41));
    }

    #[test]
    fn done_with_result_never_compares_equal() {
        assert_ne!(finished(), finished());
        assert_eq!(Status::<String>::Done, Status::Done);
    }

    #[test]
    fn only_done_variants_are_done() {
        assert!(!progress(0, 100).is_done());
        assert!(progress(0, 100).is_unresolved());
        assert!(Status::<String>::Done.is_done());
        assert!(finished().is_done());
        assert!(!Status::<String>::Running.is_done());
    }

    #[test]
    fn lifecycle_order_is_enforced() {
        let ready = Status::<String>::ReadyToRun;
        let running = Status::<String>::Running;

        assert!(ready.allows(&running));
        assert!(ready.allows(&progress(1, 10)));
        assert!(running.allows(&progress(1, 10)));
        assert!(progress(1, 10).allows(&progress(1, 5)));
        assert!(progress(1, 10).allows(&finished()));
        assert!(running.allows(&finished()));

        assert!(!running.allows(&ready));
        assert!(!progress(1, 10).allows(&running));
        assert!(!finished().allows(&running));
        assert!(!Status::<String>::Done.allows(&finished()));
    }

    #[test]
    fn accessors_expose_payloads() {
        let failed: Status<String> = Status::DoneWithResult {
            result: Err(JobError::Panicked("boom".into())),
            duration: Duration::from_millis(3),
        };
        assert!(failed.result().unwrap().is_err());
        assert_eq!(failed.duration(), Some(Duration::from_millis(3)));
        assert_eq!(progress(7, 30).progress(), Some(30));
        assert_eq!(progress(7, 30).eta(), Some(Duration::from_secs(7)));
        assert_eq!(Status::<String>::Running.progress(), None);
    }

    #[test]
    fn kind_display() {
        assert_eq!(StatusKind::ReadyToRun.to_string(), "READY_TO_RUN");
        assert_eq!(StatusKind::Running.to_string(), "RUNNING");
        assert_eq!(
            StatusKind::RunningWithProgress.to_string(),
            "RUNNING_WITH_PROGRESS"
        );
        assert_eq!(StatusKind::Done.to_string(), "DONE");
        assert_eq!(StatusKind::DoneWithResult.to_string(), "DONE_WITH_RESULT");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&StatusKind::RunningWithProgress).unwrap();
        assert_eq!(json, "\"running_with_progress\"");
    }
}
