//! Push-only telemetry: typed metric events serialised to JSONL.
//!
//! The sink never feeds back into game logic; a failed write is reported on
//! stderr and dropped.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricEvent {
    Counter {
        name: String,
        value: f64,
        #[serde(skip_serializing_if = "Value::is_null")]
        labels: Value,
    },
    Gauge {
        name: String,
        value: f64,
        #[serde(skip_serializing_if = "Value::is_null")]
        labels: Value,
    },
    Latency {
        name: String,
        millis: f64,
        success: bool,
        #[serde(skip_serializing_if = "Value::is_null")]
        labels: Value,
    },
    System {
        name: String,
        #[serde(skip_serializing_if = "Value::is_null")]
        detail: Value,
    },
}

pub trait TelemetrySink: Send {
    fn record(&self, event: MetricEvent);

    fn counter(&self, name: &str, value: f64, labels: Value) {
        self.record(MetricEvent::Counter {
            name: name.to_string(),
            value,
            labels,
        });
    }

    fn gauge(&self, name: &str, value: f64, labels: Value) {
        self.record(MetricEvent::Gauge {
            name: name.to_string(),
            value,
            labels,
        });
    }

    fn latency(&self, name: &str, millis: f64, success: bool, labels: Value) {
        self.record(MetricEvent::Latency {
            name: name.to_string(),
            millis,
            success,
            labels,
        });
    }

    fn system(&self, name: &str, detail: Value) {
        self.record(MetricEvent::System {
            name: name.to_string(),
            detail,
        });
    }
}

/// Discards everything. Used in tests and when telemetry is disabled.
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&self, _event: MetricEvent) {}
}

#[derive(Serialize)]
struct TelemetryRow<'a> {
    ts: String,
    seq: u64,
    #[serde(flatten)]
    event: &'a MetricEvent,
}

/// Appends one JSON object per event to `telemetry.jsonl` under the
/// configured directory.
pub struct JsonlTelemetry {
    writer: Mutex<BufWriter<File>>,
    seq: AtomicU64,
}

impl JsonlTelemetry {
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("telemetry.jsonl"))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            seq: AtomicU64::new(0),
        })
    }

    /// Build from `TELEMETRY_DIR`, falling back to the null sink.
    pub fn from_env() -> Box<dyn TelemetrySink> {
        match std::env::var("TELEMETRY_DIR") {
            Ok(dir) if !dir.is_empty() => match Self::open(dir) {
                Ok(sink) => Box::new(sink),
                Err(err) => {
                    eprintln!("[telemetry] disabled, cannot open sink: {err}");
                    Box::new(NullTelemetry)
                }
            },
            _ => Box::new(NullTelemetry),
        }
    }
}

impl TelemetrySink for JsonlTelemetry {
    fn record(&self, event: MetricEvent) {
        let row = TelemetryRow {
            ts: Utc::now().to_rfc3339(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            event: &event,
        };
        let Ok(line) = serde_json::to_string(&row) else {
            return;
        };
        if let Ok(mut writer) = self.writer.lock() {
            if writeln!(writer, "{line}").and_then(|_| writer.flush()).is_err() {
                eprintln!("[telemetry] dropped event {line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jsonl_sink_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTelemetry::open(dir.path()).unwrap();
        sink.counter("press_layer", 1.0, json!({"event_type": "expedition"}));
        sink.latency("llm_enhance", 12.5, true, Value::Null);

        let raw = std::fs::read_to_string(dir.path().join("telemetry.jsonl")).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "counter");
        assert_eq!(first["name"], "press_layer");
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["kind"], "latency");
        assert_eq!(second["success"], true);
    }
}
