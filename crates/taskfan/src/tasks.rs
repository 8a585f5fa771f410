//! Cooperative fan-out of async work over a fixed number of lanes.
//!
//! A lane is a future that repeatedly claims the next item from a shared
//! cursor and awaits the worker on it. All lanes are polled from the caller's
//! task, so there is no parallel CPU use: lanes interleave only where the
//! worker itself suspends. This suits I/O-bound fan-out where the number of
//! in-flight operations has to be bounded.

use crate::{ConcurrencyOption, ConcurrencyResolver, EnvSource, Error, ErrorDetail, Result};
use core::fmt;
use futures::future::try_join_all;
use parking_lot::Mutex;

/// Runs a worker over every item using cooperatively scheduled lanes.
///
/// The number of lanes is `max(floor(concurrency_factor * concurrency), 1)`,
/// where `concurrency` comes from a [`ConcurrencyResolver`], capped at
/// [`MAX_LANES`]. A run never starts more lanes than it has items, as far as
/// the iterator's size hint tells.
///
/// Each item is handed to exactly one worker invocation. Items are claimed in
/// input order, and a lane processes the items it claims strictly one after
/// another; completion order across lanes is unspecified.
///
/// # Example
///
/// ```
/// use taskfan::{ConcurrencyResolver, ConcurrentTasks};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let resolver = ConcurrencyResolver::new();
/// ConcurrentTasks::new(1..=3, |n: u32| async move {
///     assert!(n > 0);
///     Ok::<_, std::io::Error>(())
/// })
/// .with_concurrency_factor(0.5)
/// .run(&resolver)
/// .await
/// .unwrap();
/// # }
/// ```
pub struct ConcurrentTasks<I, F> {
    items: I,
    worker: F,
    concurrency_factor: f64,
    concurrency: Option<ConcurrencyOption>,
}

impl<I, F> ConcurrentTasks<I, F> {
    /// Creates a run over `items` with a concurrency factor of `1.0`.
    pub const fn new(items: I, worker: F) -> Self {
        Self {
            items,
            worker,
            concurrency_factor: 1.0,
            concurrency: None,
        }
    }

    /// Scales the resolved concurrency to get the lane count.
    ///
    /// `0.5` runs half as many lanes as the configured concurrency; anything
    /// that would produce less than one lane (including `0.0`) runs one.
    #[must_use]
    pub const fn with_concurrency_factor(mut self, concurrency_factor: f64) -> Self {
        self.concurrency_factor = concurrency_factor;
        self
    }

    /// Overrides the environment with an explicit concurrency setting.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: impl Into<ConcurrencyOption>) -> Self {
        self.concurrency = Some(concurrency.into());
        self
    }

    /// Number of lanes this run would use with the given resolver, before
    /// the cap at the item count.
    ///
    /// # Errors
    ///
    /// Fails if the concurrency setting is invalid.
    pub fn lane_count<E: EnvSource>(&self, resolver: &ConcurrencyResolver<E>) -> Result<usize> {
        let concurrency = resolver.resolve(self.concurrency.clone())?;
        Ok(lane_count(self.concurrency_factor, concurrency))
    }

    /// Drives every item through the worker.
    ///
    /// Completes once all lanes have drained the cursor. If any invocation
    /// fails, the run fails with [`Error::Worker`] carrying that first error;
    /// the remaining lanes are dropped without claiming further items.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConcurrencyOption`] before any work starts.
    /// - [`Error::Worker`] for the first failing invocation.
    pub async fn run<T, Fut, WE, E>(self, resolver: &ConcurrencyResolver<E>) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        F: Fn(T) -> Fut,
        Fut: Future<Output = core::result::Result<(), WE>>,
        WE: fmt::Display,
        E: EnvSource,
    {
        let lanes = self.lane_count(resolver)?;
        let items = self.items.into_iter();
        // Lanes beyond the item count would only drain an empty cursor.
        let lanes = match items.size_hint().1 {
            Some(upper) => lanes.min(upper),
            None => lanes,
        };
        let cursor = Mutex::new(items);
        let worker = &self.worker;

        tracing::debug!(lanes, "Starting concurrent tasks");

        try_join_all((0..lanes).map(|lane| {
            let cursor = &cursor;
            async move {
                loop {
                    // The guard is dropped before the worker future is awaited.
                    let next = cursor.lock().next();
                    let Some(item) = next else {
                        break;
                    };
                    worker(item).await.map_err(|e| Error::Worker {
                        index: None,
                        detail: ErrorDetail::from_error(&e),
                    })?;
                }
                tracing::trace!("Lane {lane} drained");
                Ok::<_, Error>(())
            }
        }))
        .await?;

        tracing::debug!("Concurrent tasks complete");
        Ok(())
    }
}

/// Upper bound on lanes in a single run.
pub const MAX_LANES: usize = 4096;

fn lane_count(concurrency_factor: f64, concurrency: usize) -> usize {
    // `as` maps NaN and negatives to zero and saturates large values.
    let lanes = (concurrency_factor * concurrency as f64).floor() as usize;
    lanes.clamp(1, MAX_LANES)
}
