pub mod cancel;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod poller;

pub use coordinator::DeidentificationCoordinator;
pub use error::JobError;
pub use job::{JobId, JobReport, JobRequest};
#[cfg(test)]
pub use poller::PollPolicy;
