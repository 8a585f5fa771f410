//! Error types for the task runners.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a run can surface to its caller. Nothing here is retried: the first error of
//! a run is the one the caller sees.
//!
//! ## Error Cases
//! - `InvalidConcurrencyOption`: The concurrency setting is not a boolean or
//!   integer token. Raised before any work starts.
//! - `Worker`: A worker invocation failed on an item.
//! - `ThreadStartup`: [`Worker::start`] failed inside a worker thread, before
//!   the thread processed anything.
//! - `ThreadExit`: A worker thread terminated abnormally without reporting an
//!   error first (a panic, in practice).
//! - `ChannelError`: Thread spawn failure or a broken channel between the
//!   coordinator and a thread.
//!
//! [`Worker::start`]: crate::Worker::start

use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Exit code recorded for a worker thread that unwound instead of stopping
/// cleanly. Matches the status a Rust process exits with after a panic.
pub const PANIC_EXIT_CODE: i32 = 101;

/// Unified error type for both runners.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The concurrency setting could not be coerced to a worker count.
    #[error("Concurrency option value '{value}' is not a boolean or integer")]
    InvalidConcurrencyOption { value: String },

    /// A worker failed while processing an item.
    ///
    /// `index` is the position of the failing item in the input when the
    /// runner tracks it (the thread runner always does).
    #[error("{detail}")]
    Worker {
        index: Option<usize>,
        detail: ErrorDetail,
    },

    /// A worker thread could not build its worker.
    #[error("Worker thread {thread} failed to start: {detail}")]
    ThreadStartup { thread: usize, detail: ErrorDetail },

    /// A worker thread terminated without reporting an error.
    #[error("Worker thread {thread} exited with code {code}{}", fmt_reason(.reason))]
    ThreadExit {
        thread: usize,
        code: i32,
        reason: Option<String>,
    },

    /// Internal communication failure between the coordinator and a thread.
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// The detail carried by a worker or startup failure, if any.
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Worker { detail, .. } | Self::ThreadStartup { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

fn fmt_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(": {reason}"))
        .unwrap_or_default()
}

/// Transferable description of a worker error.
///
/// This is what crosses the thread boundary in place of the error value
/// itself, so it only holds owned strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorDetail {
    /// Type name of the original error.
    pub name: String,
    /// `Display` output of the original error.
    pub message: String,
}

impl ErrorDetail {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Captures `error` as a detail named after its type.
    pub fn from_error<E: fmt::Display>(error: &E) -> Self {
        Self::new(core::any::type_name::<E>(), error.to_string())
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}
