// SPDX-License-Identifier: Apache-2.0

//! Last observed state of the watched path, and the rule that turns a fresh
//! observation into a change event. Both watcher variants share it.

use std::io;
use std::path::Path;
use std::time::SystemTime;

use super::traits::ChangeEvent;
use crate::tail::file_id::FileId;

/// What a single stat of the watched path returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Probe {
    Missing,
    Present {
        identity: Option<FileId>,
        size: u64,
        modified: Option<SystemTime>,
    },
}

impl Probe {
    pub(crate) async fn stat(path: &Path) -> io::Result<Self> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(Probe::Present {
                identity: FileId::from_metadata(&metadata),
                size: metadata.len(),
                modified: metadata.modified().ok(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Probe::Missing),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FileState {
    /// Identity of the file the reader has open, when known
    identity: Option<FileId>,
    /// Size at the last observation since the last bind
    size: u64,
    modified: Option<SystemTime>,
    /// Pipes always report a zero size; fall back to modification times
    pipe: bool,
}

impl FileState {
    pub(crate) fn new(pipe: bool) -> Self {
        Self {
            pipe,
            ..Default::default()
        }
    }

    pub(crate) fn bind(&mut self, identity: Option<FileId>) {
        *self = Self {
            identity,
            pipe: self.pipe,
            ..Default::default()
        };
    }

    /// Classify a probe against the reader's current `offset`.
    ///
    /// A shrink below `offset` or below the last observed size is always a
    /// truncation, even if the file has also been appended to since. The
    /// second case covers a file rewritten in place under a pending partial
    /// line, where the reader's offset stays below the new size.
    pub(crate) fn observe(&mut self, probe: &Probe, offset: u64) -> Option<ChangeEvent> {
        let Probe::Present {
            identity,
            size,
            modified,
        } = probe
        else {
            return Some(ChangeEvent::Deleted);
        };

        if let (Some(bound), Some(current)) = (self.identity, identity) {
            if bound != *current {
                return Some(ChangeEvent::Created);
            }
        }

        let baseline = self.size.max(offset);
        let touched = self.modified.is_some() && self.modified != *modified;
        self.modified = *modified;

        if *size < offset || *size < self.size {
            self.size = *size;
            return Some(ChangeEvent::Truncated);
        }

        if *size > baseline {
            self.size = *size;
            return Some(ChangeEvent::Modified);
        }

        self.size = *size;
        if self.pipe && touched {
            return Some(ChangeEvent::Modified);
        }
        None
    }
}
