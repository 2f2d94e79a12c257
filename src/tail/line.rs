// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::error::Error;

/// A single record read from the file.
#[derive(Debug)]
pub struct Line {
    /// Content without the terminator
    pub text: String,
    /// When the line was read
    pub time: DateTime<Utc>,
    /// Set only on synthetic notices, never for file content
    pub err: Option<Error>,
}

impl Line {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            time: Utc::now(),
            err: None,
        }
    }

    /// Notice emitted when delivery is paused for `cooloff`.
    pub fn rate_limited(cooloff: Duration) -> Self {
        let err = Error::RateLimited(cooloff);
        Self {
            text: err.to_string(),
            time: Utc::now(),
            err: Some(err),
        }
    }

    pub fn is_notice(&self) -> bool {
        self.err.is_some()
    }
}
