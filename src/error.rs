//! Error types for the crawler framework.
//!
//! Recoverable failures (bad proxies, failed fetches, parser exceptions) are
//! handled in place by the components that see them; only these error types
//! cross component boundaries.

use thiserror::Error;

/// Errors surfaced by the backing key/value store.
///
/// Store unreachability is fatal to a task: the scheduler terminates the run
/// when any component reports `Unavailable`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the connection was lost.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    /// The store answered, but not in the shape the operation expected.
    #[error("backing store protocol error: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

/// Top-level error type for a crawl task.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Task configuration rejected before any worker started.
    #[error("configuration error: {0}")]
    Config(String),
    /// The user `prepare` hook failed; nothing was scheduled.
    #[error("prepare failed: {0}")]
    Prepare(#[source] anyhow::Error),
    /// A supervisor-side task (collector, monitor, log writer) died.
    #[error("supervisor task failed: {0}")]
    Supervisor(String),
}

/// Convenience alias used throughout the scheduler.
pub type CrawlResult<T> = Result<T, CrawlError>;
