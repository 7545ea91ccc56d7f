use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use faropt_api::schemas::{LogEventSchema, LogEventsQuery};
use serde::Serialize;

use crate::backend::LogService;
use crate::error::{FarOptError, LogErr};

/// A single line of job output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    /// Emission time in milliseconds since the unix epoch.
    pub timestamp: i64,
    pub message: String,
}

impl LogEvent {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

impl From<LogEventSchema> for LogEvent {
    fn from(event: LogEventSchema) -> Self {
        Self {
            timestamp: event.timestamp,
            message: event.message,
        }
    }
}

/// Split captured micro output into events stamped with the submission time.
pub(crate) fn micro_events(micrologs: &str, timestamp: i64) -> Vec<LogEvent> {
    micrologs
        .lines()
        .map(|line| LogEvent {
            timestamp,
            message: line.to_string(),
        })
        .collect()
}

enum Source {
    Remote {
        logs: Arc<dyn LogService>,
        group: String,
        stream: String,
        start_time: Option<i64>,
        next_token: Option<String>,
    },
    Replay,
}

/// Forward-only, lazily fetched sequence of log events.
///
/// Pages are requested until one comes back empty. The first `skip` events are dropped, so a
/// stream can be resumed by passing the [`LogStream::position`] reached by a previous one.
pub struct LogStream {
    source: Source,
    buffer: VecDeque<LogEvent>,
    skip: usize,
    position: usize,
    finished: bool,
}

impl LogStream {
    pub(crate) fn remote(
        logs: Arc<dyn LogService>,
        group: impl Into<String>,
        stream: impl Into<String>,
        start_time: Option<i64>,
        skip: usize,
    ) -> Self {
        Self {
            source: Source::Remote {
                logs,
                group: group.into(),
                stream: stream.into(),
                start_time,
                next_token: None,
            },
            buffer: VecDeque::new(),
            skip,
            position: skip,
            finished: false,
        }
    }

    pub(crate) fn replay(events: Vec<LogEvent>, skip: usize) -> Self {
        Self {
            source: Source::Replay,
            buffer: events.into_iter().skip(skip).collect(),
            skip: 0,
            position: skip,
            finished: true,
        }
    }

    /// Number of events before the next one this stream yields, counting skipped ones.
    pub fn position(&self) -> usize {
        self.position
    }

    fn fetch_page(&mut self) -> Result<(), FarOptError> {
        let Source::Remote {
            logs,
            group,
            stream,
            start_time,
            next_token,
        } = &mut self.source
        else {
            self.finished = true;
            return Ok(());
        };

        let query = LogEventsQuery {
            start_time: *start_time,
            start_from_head: true,
            next_token: next_token.clone(),
        };
        let page = logs
            .get_log_events(group, stream, &query)
            .log_err(&format!("Failed to fetch logs from {stream}"))?;
        *next_token = page.next_forward_token;

        let count = page.events.len();
        log::debug!("Fetched {count} log events from {stream}");
        if count == 0 {
            self.finished = true;
            return Ok(());
        }

        let dropped = self.skip.min(count);
        self.skip -= dropped;
        self.buffer
            .extend(page.events.into_iter().skip(dropped).map(LogEvent::from));
        Ok(())
    }
}

impl Iterator for LogStream {
    type Item = Result<LogEvent, FarOptError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                self.position += 1;
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}
