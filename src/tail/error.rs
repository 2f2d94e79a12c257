// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::tail::watcher::WatcherError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to open file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Seek error on {path:?}: {source}")]
    Seek {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error reading {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error watching for changes on {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: WatcherError,
    },

    #[error("Too much log activity; waiting {0:?} before resuming tailing")]
    RateLimited(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
