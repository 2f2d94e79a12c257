// SPDX-License-Identifier: Apache-2.0

//! On-disk file identity (device + inode).
//!
//! The identity stays stable while a file is appended to or truncated in
//! place, and changes when the path is recreated. Watchers use it to tell a
//! rotated-in replacement apart from the file the reader has open.

use serde::{Deserialize, Serialize};
use std::fs::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    /// Device ID
    dev: u64,
    /// Inode number
    ino: u64,
}

impl FileId {
    pub fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    /// Identity of the file described by `metadata`.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    /// Stable file indexes are not exposed through std on this platform;
    /// replacement detection falls back to size tracking alone.
    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn id_of(path: &std::path::Path) -> FileId {
        FileId::from_metadata(&std::fs::metadata(path).unwrap()).unwrap()
    }

    #[test]
    fn test_same_file_same_id() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        assert_eq!(id_of(file.path()), id_of(file.path()));
    }

    #[test]
    fn test_stable_across_append_and_truncate() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        let before = id_of(file.path());

        file.write_all(b" more").unwrap();
        file.as_file().set_len(0).unwrap();

        assert_eq!(before, id_of(file.path()));
    }

    #[test]
    fn test_recreated_file_gets_new_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"one\n").unwrap();
        // Keep the first inode alive so it cannot be reused
        let _held = std::fs::File::open(&path).unwrap();
        let first = id_of(&path);

        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"two\n").unwrap();

        assert_ne!(first, id_of(&path));
    }

    #[test]
    fn test_file_id_serde() {
        let id = FileId::new(7, 42);
        let json = serde_json::to_string(&id).unwrap();
        let id2: FileId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn test_file_id_display() {
        let id = FileId { dev: 123, ino: 456 };
        assert_eq!(format!("{}", id), "123:456");
    }
}
