// SPDX-License-Identifier: Apache-2.0

//! Cooperative lifecycle supervision for a single tail session.
//!
//! A [`Supervisor`] is cloned into every task that belongs to a session: the
//! read loop and any watcher task producing change notifications. It carries
//! three things:
//!
//! - a dying signal that every suspension point selects on,
//! - a first-error register holding the terminal cause of the session,
//! - a task tracker, so that waiting for the session also waits for every task
//!   it spawned.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;

use crate::tail::Error;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Running normally.
    Alive,
    /// A stop was requested or a fatal error recorded; tasks are winding down.
    Dying,
    /// The read loop has exited and released its file handle.
    Dead,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    err: Option<Arc<Error>>,
    draining: bool,
}

#[derive(Debug)]
struct Inner {
    dying: CancellationToken,
    dead: CancellationToken,
    tasks: TaskTracker,
    state: Mutex<State>,
}

/// Cancellation signal and first-error register shared by one session.
#[derive(Debug, Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let tasks = TaskTracker::new();
        // Closing only means wait() may complete once the tracker is empty,
        // tasks can still be spawned afterwards.
        tasks.close();

        Self {
            inner: Arc::new(Inner {
                dying: CancellationToken::new(),
                dead: CancellationToken::new(),
                tasks,
                state: Mutex::new(State {
                    phase: Phase::Alive,
                    err: None,
                    draining: false,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a graceful stop.
    pub fn stop(&self) {
        {
            let mut state = self.state();
            if state.phase == Phase::Alive {
                state.phase = Phase::Dying;
            }
        }
        self.inner.dying.cancel();
    }

    /// Request a stop that only takes effect once the reader reaches the end
    /// of the file. Has no effect if the session is already dying.
    pub fn stop_at_eof(&self) {
        {
            let mut state = self.state();
            if state.phase != Phase::Alive {
                return;
            }
            state.phase = Phase::Dying;
            state.draining = true;
        }
        self.inner.dying.cancel();
    }

    /// Record a fatal error and start tearing the session down.
    ///
    /// Only the first error is kept. A graceful stop requested earlier does
    /// not prevent the error from being recorded.
    pub fn fail(&self, err: Error) {
        {
            let mut state = self.state();
            if state.phase == Phase::Dead {
                return;
            }
            if state.err.is_none() {
                state.err = Some(Arc::new(err));
            }
            state.phase = Phase::Dying;
            state.draining = false;
        }
        self.inner.dying.cancel();
    }

    /// Mark the session as finished. Called once by the read loop on exit.
    pub fn mark_done(&self) {
        self.state().phase = Phase::Dead;
        self.inner.dying.cancel();
        self.inner.dead.cancel();
    }

    /// Resolves once the session starts dying.
    pub fn dying(&self) -> WaitForCancellationFuture<'_> {
        self.inner.dying.cancelled()
    }

    pub fn is_dying(&self) -> bool {
        self.inner.dying.is_cancelled()
    }

    /// True when the stop was requested through [`Supervisor::stop_at_eof`]
    /// and no error has been recorded since.
    pub fn is_draining(&self) -> bool {
        self.state().draining
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// The first recorded error, if any.
    pub fn err(&self) -> Option<Arc<Error>> {
        self.state().err.clone()
    }

    /// Wait until the session is dead and all of its tasks have returned.
    pub async fn wait(&self) -> Result<(), Arc<Error>> {
        self.inner.dead.cancelled().await;
        self.inner.tasks.wait().await;
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Spawn a task owned by this session. The task inherits the caller's
    /// tracing subscriber.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tasks.spawn(task.with_current_subscriber())
    }

    /// Number of tasks spawned through this supervisor that are still running.
    pub fn running_tasks(&self) -> usize {
        self.inner.tasks.len()
    }
}
