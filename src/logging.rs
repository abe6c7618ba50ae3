//! Multi-sink logging behind the `log` facade.
//!
//! The crate logs through the ordinary `log` macros; a static dispatcher
//! fans every record out to the registered [`LogSink`]s. The CLI installs
//! a file sink (`chisel.log`) and, unless `--quiet`, a level-filtered
//! console sink. The façade temporarily installs a callback sink for the
//! duration of a run to forward records to an observer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Destination for log records.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, target: &str, message: &str);
    fn flush(&self) {}
}

/// Handle returned by [`add_sink`]; pass to [`remove_sink`].
pub type SinkId = u64;

struct Dispatcher {
    sinks: RwLock<Vec<(SinkId, Box<dyn LogSink>)>>,
}

static DISPATCHER: Dispatcher = Dispatcher {
    sinks: RwLock::new(Vec::new()),
};
static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

impl Log for Dispatcher {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        // Sinks apply their own filtering.
        true
    }

    fn log(&self, record: &Record) {
        let sinks = self.sinks.read().unwrap();
        if sinks.is_empty() {
            return;
        }
        let message = record.args().to_string();
        for (_, sink) in sinks.iter() {
            sink.log(record.level(), record.target(), &message);
        }
    }

    fn flush(&self) {
        for (_, sink) in self.sinks.read().unwrap().iter() {
            sink.flush();
        }
    }
}

/// Install the dispatcher as the global logger. Safe to call repeatedly;
/// only the first call takes effect.
pub fn init() {
    if log::set_logger(&DISPATCHER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

/// Register a sink; it starts receiving records immediately.
pub fn add_sink(sink: Box<dyn LogSink>) -> SinkId {
    let id = NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed);
    DISPATCHER.sinks.write().unwrap().push((id, sink));
    id
}

/// Unregister the sink returned by a previous [`add_sink`].
pub fn remove_sink(id: SinkId) {
    DISPATCHER.sinks.write().unwrap().retain(|(sid, _)| *sid != id);
}

/// Remove every registered sink.
pub fn clear_sinks() {
    DISPATCHER.sinks.write().unwrap().clear();
}

// ── Built-in sinks ───────────────────────────────────────────────────────────

/// Appends `[LEVEL][target] message` lines to a log file.
pub struct FileSink {
    out: Mutex<File>,
}

impl FileSink {
    pub fn new(path: &Path, append: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(FileSink {
            out: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn log(&self, level: Level, target: &str, message: &str) {
        let mut out = self.out.lock().unwrap();
        let _ = writeln!(out, "[{level}][{target}] {message}");
        let _ = out.flush();
    }
}

/// Writes level-filtered, styled lines to stderr (stdout stays clean for
/// pipe mode).
pub struct ConsoleSink {
    pub max_level: LevelFilter,
}

impl ConsoleSink {
    pub fn new(max_level: LevelFilter) -> Self {
        ConsoleSink { max_level }
    }
}

impl LogSink for ConsoleSink {
    fn log(&self, level: Level, _target: &str, message: &str) {
        if level > self.max_level {
            return;
        }
        let line = match level {
            Level::Error => format!("{} {message}", console::style("error:").red().bold()),
            Level::Warn => format!("{} {message}", console::style("warning:").yellow().bold()),
            Level::Info => message.to_owned(),
            _ => format!("{}", console::style(message).dim()),
        };
        eprintln!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Collect(Arc<Mutex<Vec<String>>>);

    impl LogSink for Collect {
        fn log(&self, level: Level, target: &str, message: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{level}|{target}|{message}"));
        }
    }

    #[test]
    fn sinks_receive_records_until_removed() {
        init();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let id = add_sink(Box::new(Collect(Arc::clone(&lines))));

        log::info!(target: "test-target", "hello");
        assert!(lines
            .lock()
            .unwrap()
            .iter()
            .any(|l| l == "INFO|test-target|hello"));

        remove_sink(id);
        let before = lines.lock().unwrap().len();
        log::info!(target: "test-target", "ignored");
        assert_eq!(lines.lock().unwrap().len(), before);
    }

    #[test]
    fn file_sink_writes_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("t.log");
        let sink = FileSink::new(&path, false).unwrap();
        sink.log(Level::Warn, "tag", "message body");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[WARN][tag] message body\n");
    }
}
