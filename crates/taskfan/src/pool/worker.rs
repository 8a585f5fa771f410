use core::fmt;

/// A per-thread worker for [`WorkerQueueThreads`].
///
/// Every pool thread calls [`start`](Self::start) once with its own copy of the
/// context, then calls [`process`](Self::process) for each item it is
/// assigned. The worker value never leaves the thread that built it, so it
/// does not need to be `Send`.
///
/// `start` is an associated function without a receiver: it can only see the
/// context it is given. Anything a worker needs must travel in `Context`
/// (copied into each thread) or in the items. Memory that threads should
/// genuinely share has to be an explicitly shareable handle inside the
/// context, such as an `Arc` of atomics.
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
/// use taskfan::Worker;
///
/// struct Scale {
///     factor: u64,
/// }
///
/// impl Worker for Scale {
///     type Context = u64;
///     type Item = u64;
///     type Output = u64;
///     type Error = Infallible;
///
///     fn start(factor: u64) -> Result<Self, Infallible> {
///         Ok(Self { factor })
///     }
///
///     fn process(&mut self, item: u64) -> Result<u64, Infallible> {
///         Ok(item * self.factor)
///     }
/// }
/// ```
///
/// [`WorkerQueueThreads`]: crate::WorkerQueueThreads
pub trait Worker: Sized + 'static {
    /// Data copied into every thread at startup.
    type Context: Clone + Send + 'static;
    /// Input item, moved into the thread that processes it.
    type Item: Send + 'static;
    /// Result value, moved back to the coordinator.
    type Output: Send + 'static;
    /// Failure type; only its type name and message cross back.
    type Error: fmt::Display;

    /// Builds the worker for one thread.
    ///
    /// # Errors
    ///
    /// A failure here is reported as a thread startup error and fails the run.
    fn start(context: Self::Context) -> Result<Self, Self::Error>;

    /// Processes one item.
    ///
    /// # Errors
    ///
    /// A failure here fails the run with a worker error for this item.
    fn process(&mut self, item: Self::Item) -> Result<Self::Output, Self::Error>;
}
