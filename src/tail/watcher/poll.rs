// SPDX-License-Identifier: Apache-2.0

//! Polling-based file watcher as a fallback for systems where native
//! file system notifications are unavailable or unreliable (e.g., NFS).

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::state::{FileState, Probe};
use super::traits::{FileChanges, FileWatcher, WatcherError};
use crate::supervisor::Supervisor;
use crate::tail::file_id::FileId;

/// Polling-based file watcher.
///
/// Stats the watched path on a fixed interval. Detection latency is bounded
/// by the poll interval.
pub struct PollWatcher {
    path: PathBuf,
    poll_interval: Duration,
    state: Arc<Mutex<FileState>>,
}

impl PollWatcher {
    pub fn new(path: impl AsRef<Path>, poll_interval: Duration, pipe: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval,
            state: Arc::new(Mutex::new(FileState::new(pipe))),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// The parent directory must be reachable for the watch to make sense.
async fn check_watchable(path: &Path) -> Result<(), WatcherError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Err(e) = tokio::fs::metadata(parent).await {
        return Err(WatcherError::Watch(format!(
            "cannot watch directory {:?}: {}",
            parent, e
        )));
    }
    match tokio::fs::metadata(path).await {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(WatcherError::Watch(
            format!("cannot stat {:?}: {}", path, e),
        )),
        _ => Ok(()),
    }
}

impl FileWatcher for PollWatcher {
    fn bind(&mut self, identity: Option<FileId>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bind(identity);
    }

    async fn block_until_exists(&mut self, supervisor: &Supervisor) -> Result<(), WatcherError> {
        check_watchable(&self.path).await?;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = supervisor.dying() => return Err(WatcherError::NotFound(self.path.clone())),
                _ = ticker.tick() => {}
            }
            match Probe::stat(&self.path).await {
                Ok(Probe::Present { .. }) => return Ok(()),
                Ok(Probe::Missing) => {}
                Err(e) => debug!("Error polling {:?}: {}", self.path, e),
            }
        }
    }

    async fn change_events(
        &mut self,
        supervisor: &Supervisor,
        offset: u64,
    ) -> Result<FileChanges, WatcherError> {
        check_watchable(&self.path).await?;

        let (mut notifier, changes) = FileChanges::channel();
        let path = self.path.clone();
        let state = self.state.clone();
        let poll_interval = self.poll_interval;
        let sup = supervisor.clone();

        supervisor.spawn(async move {
            // First tick completes immediately, so the set reconciles with
            // whatever happened since the previous one.
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = sup.dying() => return,
                    _ = notifier.closed() => return,
                    _ = ticker.tick() => {}
                }

                let probe = match Probe::stat(&path).await {
                    Ok(probe) => probe,
                    Err(e) => {
                        warn!("Failed to stat {:?}: {}", path, e);
                        continue;
                    }
                };

                let event = state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .observe(&probe, offset);
                if let Some(event) = event {
                    debug!(path = ?path, ?event, "Poll watcher detected change");
                    notifier.notify(event);
                    return;
                }
            }
        });

        Ok(changes)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}

#[cfg(test)]
mod tests {
    use super::super::traits::ChangeEvent;
    use super::*;
    use std::fs::{self, File, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn bound_watcher(path: &Path) -> PollWatcher {
        let mut watcher = PollWatcher::new(path, Duration::from_millis(20), false);
        let identity = FileId::from_metadata(&fs::metadata(path).unwrap());
        watcher.bind(identity);
        watcher
    }

    fn append(path: &Path, content: &str) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_poll_watcher_detects_modify() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.log");
        fs::write(&path, "initial\n").unwrap();

        let mut watcher = bound_watcher(&path);
        let sup = Supervisor::new();
        let mut changes = watcher.change_events(&sup, 8).await.unwrap();

        append(&path, "more\n");
        let event = timeout(WAIT, changes.recv()).await.unwrap();
        assert_eq!(event, Some(ChangeEvent::Modified));
    }

    #[tokio::test]
    async fn test_poll_watcher_detects_truncate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.log");
        fs::write(&path, "some content\n").unwrap();

        let mut watcher = bound_watcher(&path);
        let sup = Supervisor::new();
        let mut changes = watcher.change_events(&sup, 13).await.unwrap();

        OpenOptions::new().write(true).open(&path).unwrap().set_len(0).unwrap();
        let event = timeout(WAIT, changes.recv()).await.unwrap();
        assert_eq!(event, Some(ChangeEvent::Truncated));
    }

    #[tokio::test]
    async fn test_poll_watcher_detects_remove() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.log");
        File::create(&path).unwrap();

        let mut watcher = bound_watcher(&path);
        let sup = Supervisor::new();
        let mut changes = watcher.change_events(&sup, 0).await.unwrap();

        fs::remove_file(&path).unwrap();
        let event = timeout(WAIT, changes.recv()).await.unwrap();
        assert_eq!(event, Some(ChangeEvent::Deleted));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_poll_watcher_detects_replacement() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.log");
        fs::write(&path, "old\n").unwrap();
        let _held = File::open(&path).unwrap();

        let mut watcher = bound_watcher(&path);

        // Rotate: move the old file away and put a new one in its place
        fs::rename(&path, temp_dir.path().join("test.log.1")).unwrap();
        fs::write(&path, "new\n").unwrap();

        let sup = Supervisor::new();
        let mut changes = watcher.change_events(&sup, 4).await.unwrap();
        let event = timeout(WAIT, changes.recv()).await.unwrap();
        assert_eq!(event, Some(ChangeEvent::Created));
    }

    #[tokio::test]
    async fn test_poll_watcher_quiet_file_stays_pending() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.log");
        fs::write(&path, "line\n").unwrap();

        let mut watcher = bound_watcher(&path);
        let sup = Supervisor::new();
        let mut changes = watcher.change_events(&sup, 5).await.unwrap();

        let result = timeout(Duration::from_millis(150), changes.recv()).await;
        assert!(result.is_err(), "no change should be reported");

        sup.stop();
        let ended = timeout(WAIT, changes.recv()).await.unwrap();
        assert_eq!(ended, None);
    }

    #[tokio::test]
    async fn test_poll_watcher_block_until_exists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("late.log");
        let mut watcher = PollWatcher::new(&path, Duration::from_millis(20), false);
        let sup = Supervisor::new();

        let creator = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                fs::write(&path, "hello\n").unwrap();
            })
        };

        timeout(WAIT, watcher.block_until_exists(&sup))
            .await
            .unwrap()
            .unwrap();
        assert!(path.exists());
        creator.await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_watcher_block_until_exists_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("never.log");
        let mut watcher = PollWatcher::new(&path, Duration::from_millis(20), false);
        let sup = Supervisor::new();
        sup.stop();

        let err = watcher.block_until_exists(&sup).await.unwrap_err();
        assert!(matches!(err, WatcherError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_poll_watcher_missing_directory_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone").join("test.log");
        let mut watcher = PollWatcher::new(&path, Duration::from_millis(20), false);
        let sup = Supervisor::new();

        let err = watcher.change_events(&sup, 0).await.unwrap_err();
        assert!(matches!(err, WatcherError::Watch(_)));
    }

    #[test]
    fn test_poll_watcher_backend_name() {
        let watcher = PollWatcher::new("/tmp/x.log", Duration::from_millis(100), false);
        assert_eq!(watcher.backend_name(), "poll");
    }
}
