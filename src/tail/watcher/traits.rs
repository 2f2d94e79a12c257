// SPDX-License-Identifier: Apache-2.0

//! Traits and types shared by the file watchers.

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::supervisor::Supervisor;
use crate::tail::file_id::FileId;

/// Error type for watcher operations
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the notification backend
    #[error("watcher initialization failed: {0}")]
    Init(String),

    /// Failed to watch a path
    #[error("watch failed: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel error: {0}")]
    Channel(String),

    /// The session stopped before the path came into existence
    #[error("{0:?} not found before the watch was cancelled")]
    NotFound(PathBuf),
}

/// A change observed on the watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The file grew past what the reader has seen
    Modified,
    /// The file shrank below the reader's offset
    Truncated,
    /// The path no longer exists
    Deleted,
    /// The path now refers to a different file than the one being read
    Created,
}

/// One set of change notifications.
///
/// Four one-shot signals, at most one of which fires. Once a signal has fired
/// (or the producing task has ended) the set is spent and a new one must be
/// requested with [`FileWatcher::change_events`].
#[derive(Debug)]
pub struct FileChanges {
    modified: Option<oneshot::Receiver<()>>,
    truncated: Option<oneshot::Receiver<()>>,
    deleted: Option<oneshot::Receiver<()>>,
    created: Option<oneshot::Receiver<()>>,
}

/// Producer half of a [`FileChanges`] set, owned by a watcher task.
#[derive(Debug)]
pub(crate) struct ChangeNotifier {
    modified: oneshot::Sender<()>,
    truncated: oneshot::Sender<()>,
    deleted: oneshot::Sender<()>,
    created: oneshot::Sender<()>,
}

impl FileChanges {
    pub(crate) fn channel() -> (ChangeNotifier, FileChanges) {
        let (modified_tx, modified_rx) = oneshot::channel();
        let (truncated_tx, truncated_rx) = oneshot::channel();
        let (deleted_tx, deleted_rx) = oneshot::channel();
        let (created_tx, created_rx) = oneshot::channel();

        let notifier = ChangeNotifier {
            modified: modified_tx,
            truncated: truncated_tx,
            deleted: deleted_tx,
            created: created_tx,
        };
        let changes = FileChanges {
            modified: Some(modified_rx),
            truncated: Some(truncated_rx),
            deleted: Some(deleted_rx),
            created: Some(created_rx),
        };
        (notifier, changes)
    }

    /// Wait for the set to fire.
    ///
    /// Returns `None` when the producing task ended without firing, which
    /// happens when the session is stopped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            if self.modified.is_none()
                && self.truncated.is_none()
                && self.deleted.is_none()
                && self.created.is_none()
            {
                return None;
            }

            let fired = tokio::select! {
                fired = fired(&mut self.truncated) => fired.then_some(ChangeEvent::Truncated),
                fired = fired(&mut self.deleted) => fired.then_some(ChangeEvent::Deleted),
                fired = fired(&mut self.created) => fired.then_some(ChangeEvent::Created),
                fired = fired(&mut self.modified) => fired.then_some(ChangeEvent::Modified),
            };

            if fired.is_some() {
                self.modified = None;
                self.truncated = None;
                self.deleted = None;
                self.created = None;
                return fired;
            }
        }
    }
}

/// Resolves to true when the signal fired, false when its sender went away.
/// A slot that already resolved stays pending forever.
async fn fired(slot: &mut Option<oneshot::Receiver<()>>) -> bool {
    let result = match slot.as_mut() {
        Some(rx) => rx.await,
        None => return std::future::pending().await,
    };
    *slot = None;
    result.is_ok()
}

impl ChangeNotifier {
    /// Fire one signal, closing the set.
    pub(crate) fn notify(self, event: ChangeEvent) {
        let tx = match event {
            ChangeEvent::Modified => self.modified,
            ChangeEvent::Truncated => self.truncated,
            ChangeEvent::Deleted => self.deleted,
            ChangeEvent::Created => self.created,
        };
        let _ = tx.send(());
    }

    /// Resolves once the consumer has dropped its [`FileChanges`].
    pub(crate) async fn closed(&mut self) {
        self.modified.closed().await
    }
}

/// Capability shared by the event-driven and polling watchers.
pub trait FileWatcher {
    /// Record the identity of the file the reader currently has open.
    ///
    /// Resets what the watcher remembers about the previous file.
    fn bind(&mut self, identity: Option<FileId>);

    /// Suspend until the watched path exists. Returns immediately if it does.
    ///
    /// Fails with [`WatcherError::NotFound`] if the supervisor stops first.
    fn block_until_exists(
        &mut self,
        supervisor: &Supervisor,
    ) -> impl Future<Output = Result<(), WatcherError>> + Send;

    /// Establish a watch and return the next set of change notifications.
    ///
    /// `offset` is the reader's current position, needed to report a shrink
    /// below it as a truncation.
    fn change_events(
        &mut self,
        supervisor: &Supervisor,
        offset: u64,
    ) -> impl Future<Output = Result<FileChanges, WatcherError>> + Send;

    /// The watched path.
    fn path(&self) -> &Path;

    /// Get the name of the watcher backend for logging.
    fn backend_name(&self) -> &'static str;
}
