//! Logging for hosts.
//!
//! The engine logs through `tracing` under `modsync::*` targets. Hosts that
//! want those lines through their own callback install [`HostLogLayer`]; it
//! buffers formatted lines in a [`LogBuffer`], and `run_pending_handlers`
//! hands them to the callback on the host's thread.
//!
//! The engine never installs a global subscriber; hosts add the layer to
//! their own `tracing_subscriber::registry()`.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use modsync_core::LogLevel;

/// Lines kept before the oldest is dropped.
pub const DEFAULT_CAPACITY: usize = 1024;

const TARGET_PREFIX: &str = "modsync";

/// One captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
}

/// Bounded buffer of captured lines with an adjustable threshold.
pub struct LogBuffer {
    lines: Mutex<VecDeque<LogLine>>,
    capacity: usize,
    threshold: AtomicU8,
}

const fn level_rank(level: LogLevel) -> u8 {
    match level {
        LogLevel::Trace => 0,
        LogLevel::Debug => 1,
        LogLevel::Info => 2,
        LogLevel::Warning => 3,
        LogLevel::Error => 4,
    }
}

impl LogBuffer {
    pub fn new(capacity: usize, level: LogLevel) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            threshold: AtomicU8::new(level_rank(level)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capture only lines at `level` or more severe from now on.
    pub fn set_level(&self, level: LogLevel) {
        self.threshold.store(level_rank(level), Ordering::Relaxed);
    }

    pub fn accepts(&self, level: LogLevel) -> bool {
        level_rank(level) >= self.threshold.load(Ordering::Relaxed)
    }

    pub fn push(&self, line: LogLine) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Take every captured line.
    pub fn drain(&self) -> Vec<LogLine> {
        self.lock().drain(..).collect()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, LogLevel::Info)
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

/// Layer copying engine events into a [`LogBuffer`].
pub struct HostLogLayer {
    buffer: Arc<LogBuffer>,
}

impl HostLogLayer {
    pub const fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for HostLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !meta.target().starts_with(TARGET_PREFIX) {
            return;
        }
        let level = LogLevel::from(meta.level());
        if !self.buffer.accepts(level) {
            return;
        }
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        self.buffer.push(LogLine {
            level,
            target: meta.target().to_string(),
            message: visitor.message + &visitor.fields,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(level: LogLevel, f: impl FnOnce()) -> Vec<LogLine> {
        let buffer = Arc::new(LogBuffer::new(8, level));
        let subscriber =
            tracing_subscriber::registry().with(HostLogLayer::new(Arc::clone(&buffer)));
        tracing::subscriber::with_default(subscriber, f);
        buffer.drain()
    }

    #[test]
    fn test_captures_engine_targets_only() {
        let lines = capture(LogLevel::Info, || {
            tracing::info!(target: "modsync::install", mod_id = 7, "Mod installed");
            tracing::info!(target: "hyper::client", "not ours");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].level, LogLevel::Info);
        assert_eq!(lines[0].target, "modsync::install");
        assert_eq!(lines[0].message, "Mod installed mod_id=7");
    }

    #[test]
    fn test_threshold_filters_verbose_lines() {
        let lines = capture(LogLevel::Warning, || {
            tracing::debug!(target: "modsync::scheduler", "quiet");
            tracing::warn!(target: "modsync::scheduler", "loud");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].level, LogLevel::Warning);
    }

    #[test]
    fn test_buffer_drops_oldest_when_full() {
        let buffer = LogBuffer::new(2, LogLevel::Trace);
        for n in 0..3 {
            buffer.push(LogLine {
                level: LogLevel::Info,
                target: "modsync".into(),
                message: n.to_string(),
            });
        }
        let messages: Vec<_> = buffer.drain().into_iter().map(|l| l.message).collect();
        assert_eq!(messages, vec!["1", "2"]);
    }
}
