//! Messages exchanged between the coordinator and worker threads.
//!
//! The protocol is a strict request/response loop per thread:
//!
//! ```text
//!  coordinator                         thread
//!       │                                 │  Worker::start(context)
//!       │ ◀──────────── Start ─────────── │  (or Error on failure)
//!       │ ─── Item { index, payload } ──▶ │
//!       │ ◀─── Result { index, value } ── │  (or Error on failure)
//!       │            ...                  │
//!       │ ──────────── Done ────────────▶ │  thread exits
//! ```
//!
//! Each `Start` or `Result` is answered with exactly one `Item` or `Done`, so
//! a thread never holds more than one item. These messages are the only
//! channel between the two sides; nothing else is shared unless the caller
//! puts an explicitly shareable handle in the worker context.

use crate::ErrorDetail;

/// Coordinator to thread.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum Command<I> {
    /// Process `payload`, the item at `index` in the input.
    Item { index: usize, payload: I },
    /// No more work. The thread stops listening and terminates.
    Done,
}

/// Thread to coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum Report<R> {
    /// The worker was built; the thread is ready for its first item.
    Start,
    /// The item at `index` produced `value`.
    Result { index: usize, value: R },
    /// Building the worker or processing an item failed.
    Error { detail: ErrorDetail },
}
