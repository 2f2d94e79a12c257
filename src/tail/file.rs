// SPDX-License-Identifier: Apache-2.0

//! Platform file-open primitive.

use std::fs::File;
use std::io;
use std::path::Path;

/// Open `path` for reading.
#[cfg(not(windows))]
pub fn open_file(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Open `path` for reading while letting other processes write, rename and
/// delete it, so that log rotation is not blocked by the tail.
#[cfg(windows)]
pub fn open_file(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_SHARE_READ: u32 = 0x0000_0001;
    const FILE_SHARE_WRITE: u32 = 0x0000_0002;
    const FILE_SHARE_DELETE: u32 = 0x0000_0004;

    std::fs::OpenOptions::new()
        .read(true)
        .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE)
        .open(path)
}

/// Open `path` without blocking the runtime. Opening a named pipe waits for a
/// writer, so the open runs on the blocking pool.
pub async fn open_async(path: &Path) -> io::Result<tokio::fs::File> {
    let path = path.to_path_buf();
    let file = tokio::task::spawn_blocking(move || open_file(&path))
        .await
        .map_err(io::Error::other)??;
    Ok(tokio::fs::File::from_std(file))
}
