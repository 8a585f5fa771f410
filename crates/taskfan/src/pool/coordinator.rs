//! Coordinator side of the worker-thread pool.
//!
//! This module defines [`WorkerQueueThreads`], which spawns a bounded number of
//! OS threads and feeds them items one at a time over the [`Command`] /
//! [`Report`] protocol. All bookkeeping (the next item to hand out, the result
//! slots, the first failure) lives on the coordinating thread and is only
//! touched in response to one report at a time, so none of it needs a lock.

use super::{
    Command, Report, Worker,
    thread::{Envelope, Event, thread_main},
};
use crate::{ConcurrencyOption, ConcurrencyResolver, EnvSource, Error, PANIC_EXIT_CODE, Result};
use core::{any::Any, iter::Enumerate};
use crossbeam_channel::{Receiver, Sender};
use std::{
    thread::{self, JoinHandle},
    vec,
};

/// Processes items on a pool of worker threads and returns results in input
/// order.
///
/// The pool has `min(concurrency, items.len())` threads. Each thread builds
/// its own `W` from a copy of the context, then pulls one item at a time from
/// the coordinator. `results[i]` always belongs to `items[i]`, whatever order
/// the threads finish in.
///
/// [`run`](Self::run) blocks the calling thread until every pool thread has
/// terminated. From async code, call it inside `spawn_blocking` or similar.
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
/// use taskfan::{ConcurrencyResolver, Worker, WorkerQueueThreads};
///
/// struct Offset(u32);
///
/// impl Worker for Offset {
///     type Context = u32;
///     type Item = u32;
///     type Output = u32;
///     type Error = Infallible;
///
///     fn start(offset: u32) -> Result<Self, Infallible> {
///         Ok(Self(offset))
///     }
///
///     fn process(&mut self, item: u32) -> Result<u32, Infallible> {
///         Ok(item + self.0)
///     }
/// }
///
/// let results = WorkerQueueThreads::<Offset>::new(0..5, 20)
///     .run(&ConcurrencyResolver::new())
///     .unwrap();
/// assert_eq!(results, [20, 21, 22, 23, 24]);
/// ```
pub struct WorkerQueueThreads<W: Worker> {
    items: Vec<W::Item>,
    context: W::Context,
    concurrency: Option<ConcurrencyOption>,
}

impl<W: Worker> WorkerQueueThreads<W> {
    /// Creates a run over `items`. Each thread receives its own clone of
    /// `context`.
    pub fn new(items: impl IntoIterator<Item = W::Item>, context: W::Context) -> Self {
        Self {
            items: items.into_iter().collect(),
            context,
            concurrency: None,
        }
    }

    /// Overrides the environment with an explicit concurrency setting.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: impl Into<ConcurrencyOption>) -> Self {
        self.concurrency = Some(concurrency.into());
        self
    }

    /// Number of threads this run would spawn with the given resolver.
    ///
    /// # Errors
    ///
    /// Fails if the concurrency setting is invalid.
    pub fn thread_count<E: EnvSource>(&self, resolver: &ConcurrencyResolver<E>) -> Result<usize> {
        let concurrency = resolver.resolve(self.concurrency.clone())?;
        Ok(concurrency.min(self.items.len()))
    }

    /// Runs every item through a worker and collects the results.
    ///
    /// An empty input returns an empty vector without spawning threads. On
    /// failure no partial results are returned: the first error wins, no
    /// further items are dispatched, and the call returns once every thread
    /// has terminated.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConcurrencyOption`] before any thread is spawned.
    /// - [`Error::ThreadStartup`] if [`Worker::start`] fails on a thread.
    /// - [`Error::Worker`] if [`Worker::process`] fails on an item.
    /// - [`Error::ThreadExit`] if a thread panics without reporting an error.
    /// - [`Error::ChannelError`] if a thread cannot be spawned.
    pub fn run<E: EnvSource>(self, resolver: &ConcurrencyResolver<E>) -> Result<Vec<W::Output>> {
        let thread_count = self.thread_count(resolver)?;
        if thread_count == 0 {
            return Ok(Vec::new());
        }

        tracing::debug!(
            "Spawning {thread_count} worker threads for {} items",
            self.items.len()
        );

        let (report_tx, report_rx) = crossbeam_channel::unbounded();
        let mut threads = Vec::with_capacity(thread_count);

        for id in 0..thread_count {
            // One slot: a thread never has more than one command outstanding.
            let (command_tx, command_rx) = crossbeam_channel::bounded(1);
            let context = self.context.clone();
            let reports = report_tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("taskfan-worker-{id}"))
                .spawn(move || thread_main::<W>(id, context, command_rx, reports));

            match spawned {
                Ok(join) => threads.push(PoolThread {
                    commands: Some(command_tx),
                    join: Some(join),
                    state: ThreadState::Starting,
                }),
                Err(e) => {
                    // Hanging up on the spawned threads makes them exit.
                    drop(report_rx);
                    threads.clear();
                    return Err(Error::ChannelError {
                        context: format!("Failed to spawn worker thread {id}: {e}"),
                    });
                }
            }
        }

        // Only the threads hold senders now.
        drop(report_tx);

        Coordinator::<W> {
            threads,
            queue: self.items.into_iter().enumerate(),
            results: Vec::new(),
            failure: None,
        }
        .drive(report_rx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ThreadState {
    /// Spawned, waiting for `Start` (or a startup `Error`).
    Starting,
    /// Processing the item at `index`.
    Busy { index: usize },
    /// Sent `Done` or reported an error; waiting for it to exit.
    Stopping,
    /// Terminated.
    Exited,
}

struct PoolThread<I> {
    commands: Option<Sender<Command<I>>>,
    join: Option<JoinHandle<()>>,
    state: ThreadState,
}

impl<I> PoolThread<I> {
    /// Sends `command`, returning `false` if the thread has hung up.
    fn send(&self, command: Command<I>) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|commands| commands.send(command).is_ok())
    }
}

impl<I> Drop for PoolThread<I> {
    fn drop(&mut self) {
        // No thread outlives the run, even on early returns. Hanging up first
        // makes a thread that is waiting for work exit.
        self.commands.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

struct Coordinator<W: Worker> {
    threads: Vec<PoolThread<W::Item>>,
    queue: Enumerate<vec::IntoIter<W::Item>>,
    results: Vec<Option<W::Output>>,
    failure: Option<Error>,
}

impl<W: Worker> Coordinator<W> {
    fn drive(mut self, reports: Receiver<Envelope<W::Output>>) -> Result<Vec<W::Output>> {
        self.results = (0..self.queue.len()).map(|_| None).collect();
        let mut live = self.threads.len();

        while live > 0 {
            // Every thread announces its exit, so the channel only disconnects
            // after all of them are gone.
            let Ok(Envelope { thread, event }) = reports.recv() else {
                break;
            };

            match event {
                Event::Report(Report::Start) => self.dispatch(thread),
                Event::Report(Report::Result { index, value }) => {
                    self.store(thread, index, value);
                    self.dispatch(thread);
                }
                Event::Report(Report::Error { detail }) => {
                    let error = match self.threads[thread].state {
                        ThreadState::Starting => Error::ThreadStartup { thread, detail },
                        ThreadState::Busy { index } => Error::Worker {
                            index: Some(index),
                            detail,
                        },
                        ThreadState::Stopping | ThreadState::Exited => Error::Worker {
                            index: None,
                            detail,
                        },
                    };
                    self.fail(error);
                    self.stop(thread);
                }
                Event::Exited { code } => {
                    live -= 1;
                    self.threads[thread].state = ThreadState::Exited;
                    tracing::trace!("Worker thread {thread} exited with code {code}");
                    if code != 0 {
                        self.fail(Error::ThreadExit {
                            thread,
                            code,
                            reason: None,
                        });
                    }
                }
            }
        }

        self.join_all();

        if let Some(error) = self.failure {
            tracing::debug!("Worker threads failed: {error}");
            return Err(error);
        }

        let results: Option<Vec<_>> = self.results.into_iter().collect();
        let results = results.ok_or_else(|| Error::ChannelError {
            context: "Worker threads stopped before every item was processed".to_string(),
        })?;

        tracing::debug!("Worker threads complete");
        Ok(results)
    }

    /// Answers a `Start` or `Result` with the next item, or `Done` once the
    /// queue is drained or the run has failed.
    fn dispatch(&mut self, thread: usize) {
        let next = if self.failure.is_none() {
            self.queue.next()
        } else {
            None
        };

        let Some((index, payload)) = next else {
            self.stop(thread);
            return;
        };

        tracing::trace!("Dispatching item {index} to worker thread {thread}");
        let pool_thread = &mut self.threads[thread];
        pool_thread.state = ThreadState::Busy { index };
        if !pool_thread.send(Command::Item { index, payload }) {
            // The thread hung up; its exit notice is already on the way.
            tracing::debug!("Worker thread {thread} hung up before item {index}");
        }
    }

    fn stop(&mut self, thread: usize) {
        let pool_thread = &mut self.threads[thread];
        if pool_thread.state == ThreadState::Exited {
            return;
        }
        pool_thread.state = ThreadState::Stopping;
        // A thread that already exited (startup failure) has dropped its
        // receiver; there is nothing left to tell it.
        pool_thread.send(Command::Done);
    }

    fn store(&mut self, thread: usize, index: usize, value: W::Output) {
        debug_assert_eq!(
            self.threads[thread].state,
            ThreadState::Busy { index },
            "result for an item the thread was not assigned"
        );
        let slot = &mut self.results[index];
        debug_assert!(slot.is_none(), "result slot {index} written twice");
        *slot = Some(value);
    }

    /// Records `error` unless an earlier one is already recorded.
    fn fail(&mut self, error: Error) {
        if self.failure.is_none() {
            tracing::debug!("Run failed: {error}");
            self.failure = Some(error);
        } else {
            tracing::debug!("Discarding later error: {error}");
        }
    }

    /// Joins every thread, attaching a panic message to a thread exit failure
    /// when one is available.
    fn join_all(&mut self) {
        for (id, pool_thread) in self.threads.iter_mut().enumerate() {
            let Some(join) = pool_thread.join.take() else {
                continue;
            };
            let Err(payload) = join.join() else {
                continue;
            };
            let panic = panic_reason(payload.as_ref());
            if let Some(Error::ThreadExit { thread, reason, .. }) = &mut self.failure {
                if *thread == id {
                    *reason = panic;
                }
            } else if self.failure.is_none() {
                // Panicked without its exit notice reaching us.
                self.failure = Some(Error::ThreadExit {
                    thread: id,
                    code: PANIC_EXIT_CODE,
                    reason: panic,
                });
            }
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}
