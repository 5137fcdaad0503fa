//! [`LogSink`] – bounded in-memory record of recent log events.
//!
//! Installed as a `tracing` layer by
//! [`init_tracing`][crate::telemetry::init_tracing], so every `info!` /
//! `warn!` emitted anywhere in the process also lands here and can be read
//! back by the REPL (`/logs`) or reported as `log_size`.

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use vexmind_types::LogEntry;

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct LogSink {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogSink {
    /// Keep at most `capacity` entries; the oldest are evicted first.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record(&self, entry: LogEntry) {
        let mut entries = self.entries();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries in arrival order, optionally only those whose level matches
    /// `level` case-insensitively.
    pub fn get_logs(&self, level: Option<&str>) -> Vec<LogEntry> {
        let entries = self.entries();
        match level {
            Some(level) => entries
                .iter()
                .filter(|e| e.level.eq_ignore_ascii_case(level))
                .cloned()
                .collect(),
            None => entries.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// A `tracing` layer feeding this sink.
    pub fn layer(self: &Arc<Self>) -> LogSinkLayer {
        LogSinkLayer {
            sink: Arc::clone(self),
        }
    }
}

pub struct LogSinkLayer {
    sink: Arc<LogSink>,
}

/// Flattens an event into `message key=value ...`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for LogSinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        self.sink.record(LogEntry {
            timestamp: Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message + &visitor.fields,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info, warn};
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(sink: &Arc<LogSink>, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(sink.layer());
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn events_are_recorded_with_fields() {
        let sink = Arc::new(LogSink::default());
        capture(&sink, || {
            info!(command = "vex ping", "sent command");
        });
        let logs = sink.get_logs(None);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, "INFO");
        assert_eq!(logs[0].message, "sent command command=vex ping");
        assert!(logs[0].target.contains("log_sink"));
    }

    #[test]
    fn level_filter_is_case_insensitive() {
        let sink = Arc::new(LogSink::default());
        capture(&sink, || {
            info!("a");
            warn!("b");
            error!("c");
            warn!("d");
        });
        let warnings = sink.get_logs(Some("warn"));
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[1].message, "d");
        assert_eq!(sink.get_logs(Some("ERROR")).len(), 1);
        assert_eq!(sink.len(), 4);
    }

    #[test]
    fn oldest_entries_are_evicted() {
        let sink = Arc::new(LogSink::new(2));
        capture(&sink, || {
            info!("one");
            info!("two");
            info!("three");
        });
        let messages: Vec<String> = sink.get_logs(None).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }
}
