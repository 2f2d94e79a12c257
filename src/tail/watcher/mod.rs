// SPDX-License-Identifier: Apache-2.0

//! Change notification for the tailed file.
//!
//! This module provides two watching strategies:
//! - **Native watching**: Uses OS-level file system notifications (inotify on Linux,
//!   FSEvents on macOS, ReadDirectoryChangesW on Windows) for immediate event detection.
//! - **Poll watching**: Falls back to periodic stat calls for environments
//!   where native watching isn't available or reliable (e.g., NFS, network shares).
//!
//! Both report through the same [`FileChanges`] set, and both decide what
//! changed with the same classification rule.

mod native;
mod poll;
mod state;
mod traits;

pub use native::NativeWatcher;
pub use poll::PollWatcher;
pub use traits::{ChangeEvent, FileChanges, FileWatcher, WatcherError};

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::supervisor::Supervisor;
use crate::tail::file_id::FileId;

/// Watch mode configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Automatically select the best watching strategy.
    /// Tries native watching first, falls back to polling on failure.
    #[default]
    Auto,
    /// Force native file system watching.
    /// Will fail if native watching is not supported.
    Native,
    /// Force polling mode. Use this for network file systems (NFS)
    /// or when native watching is unreliable.
    Poll,
}

impl std::str::FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(WatchMode::Auto),
            "native" => Ok(WatchMode::Native),
            "poll" | "polling" => Ok(WatchMode::Poll),
            _ => Err(format!(
                "Invalid watch mode '{}'. Valid options: auto, native, poll",
                s
            )),
        }
    }
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Watch mode: auto, native, or poll
    pub mode: WatchMode,
    /// Interval between stats in poll mode
    pub poll_interval: Duration,
    /// The target is a named pipe; detect writes by modification time
    pub pipe: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            poll_interval: Duration::from_millis(250),
            pipe: false,
        }
    }
}

/// The watcher chosen for a session.
pub enum AnyWatcher {
    Native(NativeWatcher),
    Poll(PollWatcher),
}

impl FileWatcher for AnyWatcher {
    fn bind(&mut self, identity: Option<FileId>) {
        match self {
            AnyWatcher::Native(w) => w.bind(identity),
            AnyWatcher::Poll(w) => w.bind(identity),
        }
    }

    async fn block_until_exists(&mut self, supervisor: &Supervisor) -> Result<(), WatcherError> {
        match self {
            AnyWatcher::Native(w) => w.block_until_exists(supervisor).await,
            AnyWatcher::Poll(w) => w.block_until_exists(supervisor).await,
        }
    }

    async fn change_events(
        &mut self,
        supervisor: &Supervisor,
        offset: u64,
    ) -> Result<FileChanges, WatcherError> {
        match self {
            AnyWatcher::Native(w) => w.change_events(supervisor, offset).await,
            AnyWatcher::Poll(w) => w.change_events(supervisor, offset).await,
        }
    }

    fn path(&self) -> &Path {
        match self {
            AnyWatcher::Native(w) => w.path(),
            AnyWatcher::Poll(w) => w.path(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            AnyWatcher::Native(w) => w.backend_name(),
            AnyWatcher::Poll(w) => w.backend_name(),
        }
    }
}

/// Create a watcher for `path` based on the configuration.
///
/// In `Auto` mode, this tries native watching first and falls back to polling
/// if native watching fails to initialize.
pub fn create_watcher(config: &WatcherConfig, path: &Path) -> Result<AnyWatcher, WatcherError> {
    match config.mode {
        WatchMode::Native => Ok(AnyWatcher::Native(NativeWatcher::new(path, config.pipe)?)),
        WatchMode::Poll => Ok(AnyWatcher::Poll(PollWatcher::new(
            path,
            config.poll_interval,
            config.pipe,
        ))),
        WatchMode::Auto => match NativeWatcher::new(path, config.pipe) {
            Ok(watcher) => {
                tracing::debug!("Using native file system watcher");
                Ok(AnyWatcher::Native(watcher))
            }
            Err(e) => {
                tracing::warn!(
                    "Native file watching unavailable ({}), falling back to polling",
                    e
                );
                Ok(AnyWatcher::Poll(PollWatcher::new(
                    path,
                    config.poll_interval,
                    config.pipe,
                )))
            }
        },
    }
}
