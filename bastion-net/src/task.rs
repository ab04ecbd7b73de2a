//! Scheduled work units and their completion handles.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bastion_core::constants::PRIORITY_NORMAL;
use bastion_core::{FetchError, RemoteError};
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;

/// One remote call attempt.
pub type TaskFuture = BoxFuture<'static, Result<JsonValue, RemoteError>>;

type Execute = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// A unit of scheduled work.
///
/// `execute` is invoked once per attempt, so it must be re-runnable.
#[derive(Clone)]
pub struct Task {
    pub key: String,
    /// Lower is more urgent.
    pub priority: u8,
    /// Zero means the result is not cached.
    pub cache_ttl: Duration,
    /// Falls back to the scheduler default when unset.
    pub max_attempts: Option<u32>,
    /// Whether the shared credential gate applies. Calls made with another
    /// credential neither wait on nor trip it.
    pub credential_gated: bool,
    execute: Execute,
}

impl Task {
    pub fn new<F, Fut>(key: impl Into<String>, execute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, RemoteError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            priority: PRIORITY_NORMAL,
            cache_ttl: Duration::ZERO,
            max_attempts: None,
            credential_gated: true,
            execute: Arc::new(move || -> TaskFuture { Box::pin(execute()) }),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn bypass_credential_gate(mut self) -> Self {
        self.credential_gated = false;
        self
    }

    pub(crate) fn attempt(&self) -> TaskFuture {
        (self.execute)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("cache_ttl", &self.cache_ttl)
            .field("max_attempts", &self.max_attempts)
            .field("credential_gated", &self.credential_gated)
            .finish_non_exhaustive()
    }
}

pub(crate) type Completion = oneshot::Sender<Result<JsonValue, FetchError>>;

/// Resolves to the outcome of a submitted task.
///
/// Deduplicated submissions each get their own handle onto the shared result.
#[derive(Debug)]
pub struct TaskHandle {
    rx: oneshot::Receiver<Result<JsonValue, FetchError>>,
}

impl TaskHandle {
    pub(crate) fn channel() -> (Completion, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A handle that is already resolved.
    pub(crate) fn ready(result: Result<JsonValue, FetchError>) -> Self {
        let (tx, handle) = Self::channel();
        let _ = tx.send(result);
        handle
    }
}

impl Future for TaskHandle {
    type Output = Result<JsonValue, FetchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(FetchError::Dropped)))
    }
}
