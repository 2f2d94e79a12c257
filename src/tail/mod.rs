// SPDX-License-Identifier: Apache-2.0

//! Follow a single file and stream its lines, in the manner of `tail -F`.
//!
//! A [`Tail`] owns one background read loop. The loop reads complete lines,
//! hands them over a rendezvous channel, and at the end of the file waits for
//! the watcher to report that the file grew, was truncated, or was rotated.

pub mod file;
pub mod watcher;

mod config;
mod engine;
mod error;
mod file_id;
mod line;
mod reader;

pub use config::{Location, TailConfig, Terminator, Whence};
pub use error::{Error, Result};
pub use file_id::FileId;
pub use line::Line;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::instrument::WithSubscriber;
use tracing::subscriber::NoSubscriber;
use tracing::{Dispatch, Instrument};

use crate::bounded_channel::{BoundedReceiver, rendezvous};
use crate::supervisor::Supervisor;
use engine::{Engine, Position};
use reader::LineReader;
use watcher::create_watcher;

/// Handle to a running tail session.
///
/// Dropping the handle stops the session.
pub struct Tail {
    path: PathBuf,
    lines: BoundedReceiver<Line>,
    supervisor: Supervisor,
    position: Arc<Position>,
    pipe: bool,
}

impl Tail {
    /// Start tailing `path`.
    ///
    /// Must be called from within a Tokio runtime. Fails without starting
    /// anything when the configuration is invalid, the watcher cannot be set
    /// up, or `must_exist` is set and the file cannot be opened.
    pub fn start(path: impl AsRef<Path>, config: TailConfig) -> Result<Tail> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let reader = if config.must_exist {
            open_now(&path, &config)?
        } else {
            None
        };

        let dispatch = config.logger.clone().unwrap_or_else(default_dispatch);
        let (watcher, span) = tracing::dispatcher::with_default(&dispatch, || {
            let span = tracing::info_span!("tail", path = %path.display());
            let watcher = span.in_scope(|| create_watcher(&config.watcher_config(), &path));
            (watcher, span)
        });
        let watcher = watcher.map_err(|source| Error::Watch {
            path: path.clone(),
            source,
        })?;

        let supervisor = Supervisor::new();
        let position = Arc::new(Position::default());
        let (tx, rx) = rendezvous();
        let pipe = config.pipe;

        let engine = Engine::new(
            path.clone(),
            config,
            supervisor.clone(),
            position.clone(),
            tx,
            reader,
            watcher,
        );
        supervisor.spawn(engine.run().instrument(span).with_subscriber(dispatch));

        Ok(Tail {
            path,
            lines: rx,
            supervisor,
            position,
            pipe,
        })
    }

    /// The next line, or `None` once the session has ended.
    pub async fn next_line(&self) -> Option<Line> {
        self.lines.next().await
    }

    /// The line stream. Clones share the same session.
    pub fn lines(&self) -> &BoundedReceiver<Line> {
        &self.lines
    }

    /// Stop the session after the current step.
    pub fn stop(&self) {
        self.supervisor.stop();
    }

    /// Stop once every line already in the file has been delivered.
    pub fn stop_at_eof(&self) {
        self.supervisor.stop_at_eof();
    }

    /// Wait for the session to end. Returns the error that ended it, if any.
    pub async fn wait(&self) -> std::result::Result<(), Arc<Error>> {
        self.supervisor.wait().await
    }

    /// The error that ended the session, without waiting.
    pub fn err(&self) -> Option<Arc<Error>> {
        self.supervisor.err()
    }

    /// Offset just past the last delivered line. `None` for pipes.
    pub fn tell(&self) -> Option<Location> {
        if self.pipe {
            return None;
        }
        Some(Location::start(self.position.get()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tasks of this session that have not returned yet.
    pub fn running_tasks(&self) -> usize {
        self.supervisor.running_tasks()
    }
}

impl Drop for Tail {
    fn drop(&mut self) {
        self.supervisor.stop();
    }
}

fn open_now(path: &Path, config: &TailConfig) -> Result<Option<LineReader>> {
    let open_error = |source| Error::Open {
        path: path.to_path_buf(),
        source,
    };

    // Opening a pipe blocks until a writer shows up; only check it is there
    if config.pipe {
        std::fs::metadata(path).map_err(open_error)?;
        return Ok(None);
    }

    let file = file::open_file(path).map_err(open_error)?;
    Ok(Some(LineReader::new(
        tokio::fs::File::from_std(file),
        config.terminator,
    )))
}

/// The current subscriber, or a standard error logger when none is set.
fn default_dispatch() -> Dispatch {
    let current = tracing::dispatcher::get_default(Dispatch::clone);
    if !current.is::<NoSubscriber>() {
        return current;
    }

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .finish();
    Dispatch::new(subscriber)
}
