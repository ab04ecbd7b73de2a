//! Bastion Net
//!
//! Every remote read goes through [`RequestScheduler`]:
//!
//! 1. live [`ResponseCache`](bastion_storage::ResponseCache) entries short-circuit
//!    before anything is queued
//! 2. pending tasks are ordered by priority, FIFO among equals, and deduplicated by key
//! 3. at most `max_concurrency` tasks run at once
//! 4. each attempt must be admitted by the sliding-window [`CallWindow`]
//! 5. transient failures retry with exponential backoff; a rejected credential
//!    trips the process-wide [`CredentialGate`]
//!
//! [`HttpApi`] is the reqwest-backed [`RemoteApi`].

mod credential;
mod http;
mod remote;
mod retry;
mod scheduler;
mod task;
mod window;

pub use credential::CredentialGate;
pub use http::{classify_body, classify_code, decode_response, HttpApi};
pub use remote::RemoteApi;
pub use retry::RetryPolicy;
pub use scheduler::{RequestScheduler, SchedulerStats};
pub use task::{Task, TaskFuture, TaskHandle};
pub use window::CallWindow;

pub use bastion_core::constants::{
    PRIORITY_BACKGROUND, PRIORITY_CRITICAL, PRIORITY_HIGH, PRIORITY_NORMAL,
};
