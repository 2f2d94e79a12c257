// SPDX-License-Identifier: Apache-2.0

//! Native file system watcher using the `notify` crate.
//!
//! Uses OS-level file system notifications:
//! - Linux: inotify
//! - macOS: FSEvents
//! - Windows: ReadDirectoryChangesW
//!
//! The parent directory is watched rather than the file itself, so deletion,
//! re-creation and rename of the target are all observed. Raw events only
//! wake the watcher; what changed is decided by re-stating the path.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, warn};

use super::state::{FileState, Probe};
use super::traits::{FileChanges, FileWatcher, WatcherError};
use crate::supervisor::Supervisor;
use crate::tail::file_id::FileId;

type RawEvents = UnboundedReceiver<notify::Result<Event>>;

/// Native file system watcher using OS-level notifications.
pub struct NativeWatcher {
    path: PathBuf,
    watcher: RecommendedWatcher,
    receiver: Arc<tokio::sync::Mutex<RawEvents>>,
    state: Arc<Mutex<FileState>>,
    watching: bool,
}

impl NativeWatcher {
    pub fn new(path: impl AsRef<Path>, pipe: bool) -> Result<Self, WatcherError> {
        let (tx, rx) = unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            watcher,
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            state: Arc::new(Mutex::new(FileState::new(pipe))),
            watching: false,
        })
    }

    /// Subscribe to the parent directory. The subscription is kept for the
    /// lifetime of the watcher so events between change sets are not lost.
    fn ensure_watching(&mut self) -> Result<(), WatcherError> {
        if self.watching {
            return Ok(());
        }
        let dir = watch_dir(&self.path);
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::Watch(format!("{:?}: {}", dir, e)))?;
        debug!(dir = ?dir, backend = self.backend_name(), "Watching directory");
        self.watching = true;
        Ok(())
    }
}

fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Whether a raw event may concern the watched file.
fn is_relevant(event: &notify::Result<Event>, path: &Path) -> bool {
    match event {
        Ok(event) => {
            if matches!(event.kind, EventKind::Access(_)) {
                return false;
            }
            // Rescans and the like carry no paths
            if event.paths.is_empty() {
                return true;
            }
            let name = path.file_name();
            event.paths.iter().any(|p| p.file_name() == name)
        }
        Err(e) => {
            warn!("File watcher error: {}", e);
            true
        }
    }
}

/// Discard queued events; the probe that follows accounts for all of them.
fn drain(rx: &mut RawEvents) {
    while rx.try_recv().is_ok() {}
}

impl FileWatcher for NativeWatcher {
    fn bind(&mut self, identity: Option<FileId>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bind(identity);
    }

    async fn block_until_exists(&mut self, supervisor: &Supervisor) -> Result<(), WatcherError> {
        self.ensure_watching()?;

        let receiver = self.receiver.clone();
        let mut rx = tokio::select! {
            _ = supervisor.dying() => return Err(WatcherError::NotFound(self.path.clone())),
            rx = receiver.lock() => rx,
        };

        loop {
            drain(&mut rx);
            match Probe::stat(&self.path).await {
                Ok(Probe::Present { .. }) => return Ok(()),
                Ok(Probe::Missing) => {}
                Err(e) => debug!("Error checking {:?}: {}", self.path, e),
            }

            loop {
                let event = tokio::select! {
                    _ = supervisor.dying() => return Err(WatcherError::NotFound(self.path.clone())),
                    event = rx.recv() => event,
                };
                match event {
                    Some(event) if is_relevant(&event, &self.path) => break,
                    Some(_) => {}
                    None => {
                        return Err(WatcherError::Channel(
                            "watcher channel disconnected".into(),
                        ));
                    }
                }
            }
        }
    }

    async fn change_events(
        &mut self,
        supervisor: &Supervisor,
        offset: u64,
    ) -> Result<FileChanges, WatcherError> {
        self.ensure_watching()?;

        let (mut notifier, changes) = FileChanges::channel();
        let path = self.path.clone();
        let receiver = self.receiver.clone();
        let state = self.state.clone();
        let sup = supervisor.clone();

        supervisor.spawn(async move {
            let mut rx = tokio::select! {
                _ = sup.dying() => return,
                _ = notifier.closed() => return,
                rx = receiver.lock_owned() => rx,
            };

            // Probe once up front for changes that happened before this set
            loop {
                drain(&mut rx);
                match Probe::stat(&path).await {
                    Ok(probe) => {
                        let event = state
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .observe(&probe, offset);
                        if let Some(event) = event {
                            debug!(path = ?path, ?event, "Native watcher detected change");
                            notifier.notify(event);
                            return;
                        }
                    }
                    Err(e) => warn!("Failed to stat {:?}: {}", path, e),
                }

                loop {
                    let event = tokio::select! {
                        _ = sup.dying() => return,
                        _ = notifier.closed() => return,
                        event = rx.recv() => event,
                    };
                    match event {
                        Some(event) if is_relevant(&event, &path) => break,
                        Some(_) => {}
                        // The watcher itself was dropped
                        None => return,
                    }
                }
            }
        });

        Ok(changes)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}
