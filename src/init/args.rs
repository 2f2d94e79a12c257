// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use std::path::PathBuf;

use crate::ratelimiter::RateLimitConfig;
use crate::tail::watcher::WatchMode;
use crate::tail::{Location, TailConfig, Terminator, Whence};

/// Watch mode for file system monitoring
#[derive(Copy, Clone, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum WatchModeArg {
    /// Native notifications first, polling if they are unavailable
    #[default]
    Auto,
    /// Force native file system watching (inotify/FSEvents/ReadDirectoryChangesW)
    Native,
    /// Force polling mode (use for NFS or when native watching is unreliable)
    Poll,
}

impl From<WatchModeArg> for WatchMode {
    fn from(w: WatchModeArg) -> Self {
        match w {
            WatchModeArg::Auto => WatchMode::Auto,
            WatchModeArg::Native => WatchMode::Native,
            WatchModeArg::Poll => WatchMode::Poll,
        }
    }
}

/// Where to start reading the file
#[derive(Copy, Clone, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum StartAtArg {
    /// Start at the beginning of the file
    #[default]
    Beginning,
    /// Start at the end of the file (only new lines)
    End,
}

impl From<StartAtArg> for Whence {
    fn from(s: StartAtArg) -> Self {
        match s {
            StartAtArg::Beginning => Whence::Start,
            StartAtArg::End => Whence::End,
        }
    }
}

/// Byte that ends each line
#[derive(Copy, Clone, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum TerminatorArg {
    /// `\n`
    #[default]
    Newline,
    /// `\r`
    #[value(name = "cr", alias = "carriage_return")]
    CarriageReturn,
}

impl From<TerminatorArg> for Terminator {
    fn from(t: TerminatorArg) -> Self {
        match t {
            TerminatorArg::Newline => Terminator::Newline,
            TerminatorArg::CarriageReturn => Terminator::CarriageReturn,
        }
    }
}

/// Options naming a tail session. Every option left unset keeps the value
/// from the configuration file or environment.
#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    /// File to tail
    pub path: PathBuf,

    /// Keep reading as the file grows
    #[arg(short, long)]
    pub follow: bool,

    /// Reopen the file when it is rotated or recreated (implies --follow)
    #[arg(short = 'F', long)]
    pub reopen: bool,

    /// Fail immediately if the file does not exist
    #[arg(long)]
    pub must_exist: bool,

    /// The path is a named pipe
    #[arg(long)]
    pub pipe: bool,

    /// Watch mode: auto (default), native, poll (for NFS)
    #[arg(value_enum, long)]
    pub watch_mode: Option<WatchModeArg>,

    /// Interval between file checks in poll mode (e.g. "250ms")
    #[arg(long)]
    pub poll_interval: Option<humantime::Duration>,

    /// Where to start reading
    #[arg(value_enum, long)]
    pub start_at: Option<StartAtArg>,

    /// Byte offset relative to --start-at; negative values count back from the end
    #[arg(long, allow_hyphen_values = true)]
    pub offset: Option<i64>,

    /// Line terminator
    #[arg(value_enum, long)]
    pub terminator: Option<TerminatorArg>,

    /// Split lines longer than this many characters
    #[arg(long)]
    pub max_line_size: Option<usize>,

    /// Lines that may be delivered back to back before throttling
    #[arg(long)]
    pub rate_limit_burst: Option<u32>,

    /// Sustained lines per second once the burst is used up
    #[arg(long)]
    pub rate_limit_per_second: Option<f64>,

    /// Pause after the rate limit trips (e.g. "1s")
    #[arg(long)]
    pub rate_limit_cooloff: Option<humantime::Duration>,

    /// JSON configuration file
    #[arg(long, env = "ROTEL_TAIL_CONFIG")]
    pub config: Option<PathBuf>,
}

impl TailArgs {
    /// Override `config` with every option given on the command line.
    pub fn apply(&self, config: &mut TailConfig) {
        if self.follow {
            config.follow = true;
        }
        if self.reopen {
            config.follow = true;
            config.reopen = true;
        }
        if self.must_exist {
            config.must_exist = true;
        }
        if self.pipe {
            config.pipe = true;
        }
        if let Some(mode) = self.watch_mode {
            config.watch_mode = mode.into();
        }
        if let Some(interval) = self.poll_interval {
            let interval: std::time::Duration = interval.into();
            config.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        }
        if self.start_at.is_some() || self.offset.is_some() {
            config.location = Some(Location {
                offset: self.offset.unwrap_or(0),
                whence: self.start_at.unwrap_or_default().into(),
            });
        }
        if let Some(terminator) = self.terminator {
            config.terminator = terminator.into();
        }
        if let Some(max) = self.max_line_size {
            config.max_line_size = Some(max);
        }

        if self.rate_limit_burst.is_some()
            || self.rate_limit_per_second.is_some()
            || self.rate_limit_cooloff.is_some()
        {
            let rate_limit = config
                .rate_limit
                .get_or_insert_with(RateLimitConfig::default);
            if let Some(burst) = self.rate_limit_burst {
                rate_limit.burst = burst;
            }
            if let Some(per_second) = self.rate_limit_per_second {
                rate_limit.per_second = per_second;
            }
            if let Some(cooloff) = self.rate_limit_cooloff {
                let cooloff: std::time::Duration = cooloff.into();
                rate_limit.cooloff_ms = u64::try_from(cooloff.as_millis()).unwrap_or(u64::MAX);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        tail: TailArgs,
    }

    fn parse(args: &[&str]) -> TailArgs {
        let mut argv = vec!["rotel-tail"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().tail
    }

    #[test]
    fn test_unset_options_keep_config() {
        let args = parse(&["/var/log/app.log"]);
        let mut config = TailConfig {
            follow: true,
            poll_interval_ms: 40,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(args.path, PathBuf::from("/var/log/app.log"));
        assert!(config.follow);
        assert_eq!(config.poll_interval_ms, 40);
        assert!(config.location.is_none());
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn test_reopen_implies_follow() {
        let args = parse(&["-F", "app.log"]);
        let mut config = TailConfig::default();
        args.apply(&mut config);
        assert!(config.follow && config.reopen);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_location_and_durations() {
        let args = parse(&[
            "app.log",
            "--start-at",
            "end",
            "--offset",
            "-100",
            "--poll-interval",
            "1s",
            "--watch-mode",
            "poll",
            "--terminator",
            "cr",
        ]);
        let mut config = TailConfig::default();
        args.apply(&mut config);

        assert_eq!(
            config.location,
            Some(Location {
                offset: -100,
                whence: Whence::End
            })
        );
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.watch_mode, WatchMode::Poll);
        assert_eq!(config.terminator, Terminator::CarriageReturn);
    }

    #[test]
    fn test_rate_limit_flags_fill_defaults() {
        let args = parse(&["app.log", "--rate-limit-burst", "5", "--rate-limit-cooloff", "250ms"]);
        let mut config = TailConfig::default();
        args.apply(&mut config);

        let rate_limit = config.rate_limit.unwrap();
        assert_eq!(rate_limit.burst, 5);
        assert_eq!(rate_limit.per_second, RateLimitConfig::default().per_second);
        assert_eq!(rate_limit.cooloff_ms, 250);
    }

    #[test]
    fn test_invalid_watch_mode_is_rejected() {
        let result = Cli::try_parse_from(["rotel-tail", "app.log", "--watch-mode", "inotify"]);
        assert!(result.is_err());
    }
}
