// SPDX-License-Identifier: Apache-2.0

//! Configuration for a tail session.

use std::fmt;
use std::io::SeekFrom;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::watcher::{WatchMode, WatcherConfig};
use crate::ratelimiter::RateLimitConfig;

/// Reference point for a [`Location`] offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Whence {
    /// Relative to the beginning of the file
    #[default]
    Start,
    /// Relative to the position right after opening, which is the beginning
    Current,
    /// Relative to the end of the file
    End,
}

/// A resumable read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub offset: i64,
    #[serde(default)]
    pub whence: Whence,
}

impl Location {
    pub fn start(offset: u64) -> Self {
        Self {
            offset: i64::try_from(offset).unwrap_or(i64::MAX),
            whence: Whence::Start,
        }
    }

    /// Only content written after the session starts.
    pub fn end() -> Self {
        Self {
            offset: 0,
            whence: Whence::End,
        }
    }
}

impl From<Location> for SeekFrom {
    fn from(location: Location) -> Self {
        match location.whence {
            Whence::Start => SeekFrom::Start(location.offset.max(0).unsigned_abs()),
            Whence::Current => SeekFrom::Current(location.offset),
            Whence::End => SeekFrom::End(location.offset),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whence = match self.whence {
            Whence::Start => "start",
            Whence::Current => "current",
            Whence::End => "end",
        };
        write!(f, "{}{:+}", whence, self.offset)
    }
}

/// Byte that ends a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminator {
    #[default]
    Newline,
    CarriageReturn,
}

impl Terminator {
    pub fn byte(self) -> u8 {
        match self {
            Terminator::Newline => b'\n',
            Terminator::CarriageReturn => b'\r',
        }
    }
}

/// Options for one tail session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Where to start reading; the beginning of the file when unset
    pub location: Option<Location>,

    /// Fail at start if the file does not exist instead of waiting for it
    pub must_exist: bool,

    /// Keep reading past the end of the file
    pub follow: bool,

    /// Reopen the path when the file is deleted or replaced; requires `follow`
    pub reopen: bool,

    /// The path is a named pipe and cannot seek
    pub pipe: bool,

    /// How changes to the file are detected
    pub watch_mode: WatchMode,

    /// Interval between stats in poll mode (in milliseconds)
    pub poll_interval_ms: u64,

    pub terminator: Terminator,

    /// Split lines longer than this many characters into several lines
    pub max_line_size: Option<usize>,

    /// Throttle delivery; unlimited when unset
    pub rate_limit: Option<RateLimitConfig>,

    /// Where the session's own diagnostics go. Defaults to the current
    /// subscriber, or standard error when none is installed.
    #[serde(skip)]
    pub logger: Option<tracing::Dispatch>,
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            location: None,
            must_exist: false,
            follow: false,
            reopen: false,
            pipe: false,
            watch_mode: WatchMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            terminator: Terminator::default(),
            max_line_size: None,
            rate_limit: None,
            logger: None,
        }
    }
}

impl TailConfig {
    /// Settings for `tail -F`: follow and reopen across rotation.
    pub fn follow_name() -> Self {
        Self {
            follow: true,
            reopen: true,
            ..Default::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            mode: self.watch_mode,
            poll_interval: self.poll_interval(),
            pipe: self.pipe,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.reopen && !self.follow {
            return Err(Error::Config("reopen requires follow".to_string()));
        }

        if self.pipe && self.location.is_some() {
            return Err(Error::Config(
                "a start location cannot be used with a pipe".to_string(),
            ));
        }

        if let Some(location) = self.location {
            if location.whence == Whence::Start && location.offset < 0 {
                return Err(Error::Config(format!(
                    "start location {} is before the beginning of the file",
                    location
                )));
            }
        }

        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }

        if self.max_line_size == Some(0) {
            return Err(Error::Config("max_line_size must be positive".to_string()));
        }

        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate().map_err(Error::Config)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TailConfig::default();
        assert!(!config.follow);
        assert!(!config.reopen);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.terminator, Terminator::Newline);
        assert_eq!(config.watch_mode, WatchMode::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reopen_requires_follow() {
        let config = TailConfig {
            reopen: true,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(TailConfig::follow_name().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TailConfig {
            pipe: true,
            location: Some(Location::end()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.pipe = false;
        assert!(config.validate().is_ok());

        config.location = Some(Location {
            offset: -5,
            whence: Whence::Start,
        });
        assert!(config.validate().is_err());

        config.location = None;
        config.max_line_size = Some(0);
        assert!(config.validate().is_err());

        config.max_line_size = Some(80);
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config.poll_interval_ms = 10;
        config.rate_limit = Some(RateLimitConfig {
            burst: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let json = r#"{
            "follow": true,
            "reopen": true,
            "watch_mode": "poll",
            "poll_interval_ms": 50,
            "terminator": "carriage_return",
            "location": { "offset": -10, "whence": "end" },
            "rate_limit": { "burst": 20 }
        }"#;
        let config: TailConfig = serde_json::from_str(json).unwrap();

        assert!(config.follow && config.reopen);
        assert_eq!(config.watch_mode, WatchMode::Poll);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.terminator.byte(), b'\r');
        assert_eq!(SeekFrom::from(config.location.unwrap()), SeekFrom::End(-10));

        let rate_limit = config.rate_limit.unwrap();
        assert_eq!(rate_limit.burst, 20);
        assert_eq!(rate_limit.cooloff_ms, 1000);
    }

    #[test]
    fn test_location_roundtrip_and_display() {
        let location = Location::start(42);
        let json = serde_json::to_string(&location).unwrap();
        assert_eq!(json, r#"{"offset":42,"whence":"start"}"#);
        assert_eq!(serde_json::from_str::<Location>(&json).unwrap(), location);

        assert_eq!(location.to_string(), "start+42");
        assert_eq!(SeekFrom::from(location), SeekFrom::Start(42));
        assert_eq!(Location::end().to_string(), "end+0");
    }
}
