//! Structured event log
//!
//! Stages emit one JSON line per notable per-file event. The sink is
//! optional; without a path the emit calls are no-ops. Write failures
//! are logged and swallowed - the event log is advisory, never a
//! correctness dependency.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::Serialize;

/// One event log entry
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub stage: &'static str,
    pub file_key: String,
    pub src_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    pub fn new(stage: &'static str, file_key: &str, src_path: &str) -> Self {
        Self {
            stage,
            file_key: file_key.to_string(),
            src_path: src_path.to_string(),
            dest_path: None,
            action: None,
            bytes: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn dest(mut self, dest_path: &str) -> Self {
        self.dest_path = Some(dest_path.to_string());
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn bytes(mut self, bytes: i64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Shared JSON-lines sink, cheap to clone into workers
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    writer: Option<Arc<Mutex<BufWriter<File>>>>,
}

impl EventSink {
    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    /// Open (appending) the JSON-lines log at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;

        Ok(Self {
            writer: Some(Arc::new(Mutex::new(BufWriter::new(file)))),
        })
    }

    /// Append one event; failures are logged, never propagated
    pub fn emit(&self, event: &Event) {
        let Some(writer) = &self.writer else {
            return;
        };

        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to serialize event: {}", e);
                return;
            }
        };

        let mut guard = match writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(e) = writeln!(guard, "{}", line).and_then(|_| guard.flush()) {
            tracing::warn!("failed to write event log entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let sink = EventSink::open(&path).unwrap();
        sink.emit(
            &Event::new("execute", "/src/a.mp3", "/src/a.mp3")
                .dest("/dst/a.mp3")
                .action("copy")
                .bytes(1024),
        );
        sink.emit(&Event::new("meta", "/src/b.mp3", "/src/b.mp3").error("probe failed"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["stage"], "execute");
        assert_eq!(first["bytes"], 1024);
        assert!(first.get("error").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["error"], "probe failed");
    }

    #[test]
    fn test_disabled_sink_is_noop() {
        let sink = EventSink::disabled();
        sink.emit(&Event::new("scan", "k", "p"));
    }
}
