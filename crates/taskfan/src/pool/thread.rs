use super::{Command, Report, Worker};
use crate::{ErrorDetail, PANIC_EXIT_CODE};
use crossbeam_channel::{Receiver, Sender};

/// What the coordinator hears from a thread: a protocol report, or notice
/// that the thread has terminated.
pub(crate) enum Event<R> {
    Report(Report<R>),
    Exited { code: i32 },
}

/// An [`Event`] tagged with the id of the thread it came from. All threads
/// share one report channel.
pub(crate) struct Envelope<R> {
    pub thread: usize,
    pub event: Event<R>,
}

/// Announces thread termination when dropped, including while unwinding.
struct ExitNotice<R> {
    thread: usize,
    reports: Sender<Envelope<R>>,
}

impl<R> Drop for ExitNotice<R> {
    fn drop(&mut self) {
        let code = if std::thread::panicking() {
            PANIC_EXIT_CODE
        } else {
            0
        };
        // The coordinator may have stopped listening already.
        let _ = self.reports.send(Envelope {
            thread: self.thread,
            event: Event::Exited { code },
        });
    }
}

/// Body of a pool thread.
///
/// Builds the worker from `context`, then answers each [`Command::Item`] with
/// a [`Report::Result`] or [`Report::Error`] until it receives
/// [`Command::Done`] or the coordinator hangs up. A startup failure is
/// reported instead of [`Report::Start`] and ends the thread.
pub(crate) fn thread_main<W: Worker>(
    thread: usize,
    context: W::Context,
    commands: Receiver<Command<W::Item>>,
    reports: Sender<Envelope<W::Output>>,
) {
    let _exit = ExitNotice {
        thread,
        reports: reports.clone(),
    };
    let send = |report: Report<W::Output>| {
        reports
            .send(Envelope {
                thread,
                event: Event::Report(report),
            })
            .is_ok()
    };

    tracing::trace!("Worker thread {thread} started");

    let mut worker = match W::start(context) {
        Ok(worker) => worker,
        Err(e) => {
            tracing::trace!("Worker thread {thread} failed to start: {e}");
            send(Report::Error {
                detail: ErrorDetail::from_error(&e),
            });
            return;
        }
    };

    if !send(Report::Start) {
        return;
    }

    while let Ok(command) = commands.recv() {
        match command {
            Command::Item { index, payload } => {
                let report = match worker.process(payload) {
                    Ok(value) => Report::Result { index, value },
                    Err(e) => Report::Error {
                        detail: ErrorDetail::from_error(&e),
                    },
                };
                if !send(report) {
                    break;
                }
            }
            Command::Done => {
                tracing::trace!("Worker thread {thread} received done");
                break;
            }
        }
    }

    tracing::trace!("Worker thread {thread} stopped");
}
