// SPDX-License-Identifier: Apache-2.0

//! The read loop behind a [`Tail`](super::Tail).

use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use super::config::TailConfig;
use super::error::{Error, Result};
use super::file::open_async;
use super::line::Line;
use super::reader::{LineReader, Record, split_line};
use super::watcher::{AnyWatcher, ChangeEvent, FileWatcher, WatcherError};
use crate::bounded_channel::{BoundedSender, Delivery};
use crate::ratelimiter::LeakyBucket;
use crate::supervisor::Supervisor;

/// Offset just past the last line handed to the consumer.
#[derive(Debug, Default)]
pub(crate) struct Position(Mutex<u64>);

impl Position {
    pub(crate) fn get(&self) -> u64 {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, offset: u64) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = offset;
    }
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Engine {
    path: PathBuf,
    config: TailConfig,
    supervisor: Supervisor,
    position: Arc<Position>,
    lines: BoundedSender<Line>,
    reader: Option<LineReader>,
    watcher: AnyWatcher,
    limiter: Option<LeakyBucket>,
    /// Reader position, excluding a partial line that will be re-read
    offset: u64,
    /// The open file was deleted or replaced at the path
    rotated: bool,
}

impl Engine {
    pub(crate) fn new(
        path: PathBuf,
        config: TailConfig,
        supervisor: Supervisor,
        position: Arc<Position>,
        lines: BoundedSender<Line>,
        reader: Option<LineReader>,
        watcher: AnyWatcher,
    ) -> Self {
        let limiter = config.rate_limit.as_ref().map(|rate_limit| rate_limit.build());
        Self {
            path,
            config,
            supervisor,
            position,
            lines,
            reader,
            watcher,
            limiter,
            offset: 0,
            rotated: false,
        }
    }

    /// Run the session to completion. The file is closed and the output
    /// stream ended before the supervisor is marked dead.
    pub(crate) async fn run(mut self) {
        if let Err(err) = self.follow().await {
            error!("Tail failed: {}", err);
            self.supervisor.fail(err);
        }

        let supervisor = self.supervisor.clone();
        drop(self);
        supervisor.mark_done();
    }

    async fn follow(&mut self) -> Result<()> {
        match &self.reader {
            Some(reader) => {
                let identity = reader.identity().await;
                self.watcher.bind(identity);
            }
            None => {
                if !self.reopen().await? {
                    return Ok(());
                }
            }
        }

        if let Some(location) = self.config.location {
            self.seek(location.into()).await?;
            info!(offset = self.offset, "Seeked to {}", location);
        }

        debug!(
            backend = self.watcher.backend_name(),
            follow = self.config.follow,
            "Tailing"
        );

        loop {
            if self.supervisor.is_dying() && !self.supervisor.is_draining() {
                return Ok(());
            }

            let Some(reader) = self.reader.as_mut() else {
                return Ok(());
            };
            let record = match reader.read_record().await {
                Ok(record) => record,
                Err(source) => {
                    return Err(Error::Read {
                        path: self.path.clone(),
                        source,
                    });
                }
            };

            match record {
                Record::Line { text, consumed } => {
                    let next = self.offset + consumed;
                    if !self.deliver(text, next).await? {
                        return Ok(());
                    }
                    continue;
                }
                Record::Partial => {
                    if !self.config.follow || self.rotated {
                        // Nothing more will be appended to this handle
                        if let Some((text, consumed)) = reader.take_partial() {
                            let next = self.offset + consumed;
                            if !self.deliver(text, next).await? {
                                return Ok(());
                            }
                        }
                    } else if !self.config.pipe {
                        // Re-read from the start of the line once it is complete
                        let offset = self.offset;
                        self.seek(SeekFrom::Start(offset)).await?;
                    }
                }
                Record::Eof => {}
            }

            if let Flow::Stop = self.at_eof().await? {
                return Ok(());
            }
        }
    }

    async fn at_eof(&mut self) -> Result<Flow> {
        if !self.config.follow || self.supervisor.is_draining() {
            return Ok(Flow::Stop);
        }

        if self.rotated {
            self.rotated = false;
            if !self.config.reopen {
                info!("Stopping tail as the file no longer exists");
                return Ok(Flow::Stop);
            }
            info!("Reopening rotated file");
            return Ok(if self.reopen().await? {
                Flow::Continue
            } else {
                Flow::Stop
            });
        }

        self.wait_for_changes().await
    }

    async fn wait_for_changes(&mut self) -> Result<Flow> {
        let mut changes = self
            .watcher
            .change_events(&self.supervisor, self.offset)
            .await
            .map_err(|source| Error::Watch {
                path: self.path.clone(),
                source,
            })?;

        let event = tokio::select! {
            _ = self.supervisor.dying() => return Ok(Flow::Stop),
            event = changes.recv() => event,
        };

        match event {
            Some(ChangeEvent::Modified) => Ok(Flow::Continue),
            Some(ChangeEvent::Truncated) => {
                info!("File truncated, reading from the beginning");
                self.seek(SeekFrom::Start(0)).await?;
                Ok(Flow::Continue)
            }
            Some(event @ (ChangeEvent::Deleted | ChangeEvent::Created)) => {
                debug!(?event, "File rotated, draining the open handle");
                self.rotated = true;
                Ok(Flow::Continue)
            }
            None if self.supervisor.is_dying() => Ok(Flow::Stop),
            None => Err(Error::Watch {
                path: self.path.clone(),
                source: WatcherError::Channel("change notifications ended".to_string()),
            }),
        }
    }

    /// Close the current handle and open the path again, waiting for it to
    /// exist. Returns false if the session stopped first.
    async fn reopen(&mut self) -> Result<bool> {
        self.reader = None;

        loop {
            match open_async(&self.path).await {
                Ok(file) => {
                    let reader = LineReader::new(file, self.config.terminator);
                    let identity = reader.identity().await;
                    self.watcher.bind(identity);
                    self.reader = Some(reader);
                    self.offset = 0;
                    self.position.set(0);
                    debug!("Opened file");
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Waiting for file to appear");
                    match self.watcher.block_until_exists(&self.supervisor).await {
                        Ok(()) => continue,
                        Err(WatcherError::NotFound(_)) => return Ok(false),
                        Err(source) => {
                            return Err(Error::Watch {
                                path: self.path.clone(),
                                source,
                            });
                        }
                    }
                }
                Err(source) => {
                    return Err(Error::Open {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<()> {
        if self.config.pipe {
            return Ok(());
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };
        let offset = reader.seek(pos).await.map_err(|source| Error::Seek {
            path: self.path.clone(),
            source,
        })?;
        self.offset = offset;
        self.position.set(offset);
        Ok(())
    }

    /// Hand a record to the consumer, split by `max_line_size`. `next` is the
    /// offset just past it. Returns false when the session should end.
    async fn deliver(&mut self, text: String, next: u64) -> Result<bool> {
        for chunk in split_line(text, self.config.max_line_size) {
            if let Some(limiter) = self.limiter.as_mut() {
                if !limiter.try_acquire() {
                    return self.cooloff().await;
                }
            }
            if !self.send(Line::new(chunk)).await {
                return Ok(false);
            }
        }

        if !self.config.pipe {
            self.offset = next;
            self.position.set(next);
        }
        Ok(true)
    }

    async fn send(&self, line: Line) -> bool {
        match self.lines.send_until_dying(line, &self.supervisor).await {
            Delivery::Sent => true,
            Delivery::Cancelled => false,
            Delivery::Disconnected => {
                debug!("Line consumer went away, stopping");
                self.supervisor.stop();
                false
            }
        }
    }

    /// Pause after the rate limit tripped, then skip whatever piled up.
    async fn cooloff(&mut self) -> Result<bool> {
        let cooloff = self
            .config
            .rate_limit
            .as_ref()
            .map(|rate_limit| rate_limit.cooloff())
            .unwrap_or_default();
        warn!(?cooloff, "Too much log activity, pausing delivery");

        if !self.send(Line::rate_limited(cooloff)).await {
            return Ok(false);
        }

        tokio::select! {
            _ = self.supervisor.dying() => return Ok(false),
            _ = tokio::time::sleep(cooloff) => {}
        }

        self.seek(SeekFrom::End(0)).await?;
        debug!(offset = self.offset, "Skipped backlog after cooloff");
        Ok(true)
    }
}
