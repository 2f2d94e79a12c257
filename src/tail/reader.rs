// SPDX-License-Identifier: Apache-2.0

use std::io::{self, SeekFrom};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::config::Terminator;
use super::file_id::FileId;

/// Outcome of one read attempt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Record {
    /// A complete record. `consumed` includes the terminator.
    Line { text: String, consumed: u64 },
    /// The file ended in the middle of a record; the bytes stay buffered.
    Partial,
    /// Nothing left to read.
    Eof,
}

/// Splits an open file into terminator-delimited records.
pub(crate) struct LineReader {
    inner: BufReader<File>,
    terminator: u8,
    buf: Vec<u8>,
}

impl LineReader {
    pub(crate) fn new(file: File, terminator: Terminator) -> Self {
        Self {
            inner: BufReader::new(file),
            terminator: terminator.byte(),
            buf: Vec::new(),
        }
    }

    /// Read up to the next terminator.
    ///
    /// Bytes of an unterminated record accumulate across calls until they are
    /// taken, discarded or completed.
    pub(crate) async fn read_record(&mut self) -> io::Result<Record> {
        let n = self.inner.read_until(self.terminator, &mut self.buf).await?;

        if n > 0 && self.buf.last() == Some(&self.terminator) {
            let consumed = self.buf.len() as u64;
            self.buf.pop();
            let text = String::from_utf8_lossy(&self.buf).into_owned();
            self.buf.clear();
            return Ok(Record::Line { text, consumed });
        }

        if self.buf.is_empty() {
            Ok(Record::Eof)
        } else {
            Ok(Record::Partial)
        }
    }

    /// Take the unterminated leftover, if any, with its length in bytes.
    pub(crate) fn take_partial(&mut self) -> Option<(String, u64)> {
        if self.buf.is_empty() {
            return None;
        }
        let consumed = self.buf.len() as u64;
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some((text, consumed))
    }

    /// Move the read position, dropping anything buffered.
    pub(crate) async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buf.clear();
        self.inner.seek(pos).await
    }

    /// Identity of the open file, which may differ from whatever is at the
    /// path by now.
    pub(crate) async fn identity(&self) -> Option<FileId> {
        let metadata = self.inner.get_ref().metadata().await.ok()?;
        FileId::from_metadata(&metadata)
    }
}

/// Split `text` into pieces of at most `max` characters.
pub(crate) fn split_line(text: String, max: Option<usize>) -> Vec<String> {
    match max {
        Some(max) if max > 0 && text.chars().count() > max => {
            let chars: Vec<char> = text.chars().collect();
            chars.chunks(max).map(|chunk| chunk.iter().collect()).collect()
        }
        _ => vec![text],
    }
}
