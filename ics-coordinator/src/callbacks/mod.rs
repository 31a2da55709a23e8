//! Callback/notification engine
//!
//! Everything the coordinator says to producers and consumers goes through
//! here. Calls are asynchronous and best-effort; failures are logged and
//! recorded in registry state, never returned to the API caller.

pub mod consumer_callbacks;
pub mod job_status;
pub mod producer_callbacks;
pub mod retry;

pub use consumer_callbacks::ConsumerCallbacks;
pub use job_status::{JobStatusNotification, JobStatusNotifier, JobStatusValue};
pub use producer_callbacks::{ProducerCallbacks, ProducerJobInfo};
pub use retry::RetryPolicy;
