mod job;
mod status;

pub use job::{Job, JobContext, JobId, JobReport, JobSettings, JobSummary, Runnable};
pub use status::{Status, StatusKind, Transition};
