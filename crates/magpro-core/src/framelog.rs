//! Frame logging
//!
//! One textual line per decoded frame: `timestamp \t hex bytes \t decoded
//! field list`, delivered to a pluggable sink. A bounded in-memory tail
//! is kept for UIs that want to show recent traffic without re-reading
//! the sink.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::VecDeque;
use std::io::{self, Write};

use crate::device::PulseRecord;

/// Maximum entries retained in the in-memory tail.
const MAX_TAIL: usize = 10000;

/// A single logged frame.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Arrival time of the frame.
    pub timestamp: DateTime<Utc>,
    /// Raw bytes as they appeared on the wire.
    pub raw: Vec<u8>,
    /// Decoded field list.
    pub summary: String,
}

impl LogEntry {
    /// Render the entry as its log line (without trailing newline).
    pub fn line(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            hex(&self.raw),
            self.summary
        )
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-session frame log.
pub struct FrameLog {
    sink: Option<Box<dyn Write + Send>>,
    tail: VecDeque<LogEntry>,
}

impl Default for FrameLog {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLog {
    /// Create a log with no sink; entries are only kept in the tail.
    pub fn new() -> Self {
        Self {
            sink: None,
            tail: VecDeque::new(),
        }
    }

    /// Create a log writing every line to `sink`.
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Some(sink),
            tail: VecDeque::new(),
        }
    }

    /// Replace the sink, dropping (and thereby flushing) any previous one.
    pub fn set_sink(&mut self, sink: Option<Box<dyn Write + Send>>) {
        self.sink = sink;
    }

    /// Record one frame.
    pub fn record(&mut self, timestamp: DateTime<Utc>, raw: &[u8], summary: &str) {
        let entry = LogEntry {
            timestamp,
            raw: raw.to_vec(),
            summary: summary.to_string(),
        };
        if let Some(sink) = self.sink.as_mut() {
            // A failing sink must not take the protocol down with it.
            if let Err(e) = writeln!(sink, "{}", entry.line()) {
                tracing::warn!("frame log sink write failed: {e}");
            }
        }
        if self.tail.len() >= MAX_TAIL {
            self.tail.pop_front();
        }
        self.tail.push_back(entry);
    }

    /// Number of entries in the in-memory tail.
    pub fn len(&self) -> usize {
        self.tail.len()
    }

    /// Whether the tail is empty.
    pub fn is_empty(&self) -> bool {
        self.tail.is_empty()
    }

    /// Iterate over the retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.tail.iter()
    }

    /// Flush the sink.
    pub fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for FrameLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Serialize a pulse log as pretty-printed JSON.
pub fn export_pulse_log<W: Write>(records: &[PulseRecord], writer: W) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    /// Write adapter capturing everything in memory.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_format() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 45).unwrap();
        let entry = LogEntry {
            timestamp: ts,
            raw: vec![0xFE, 0x04, 0x02, 0x00, 0x58, 0x00, 0x9A, 0xFF],
            summary: "pulse_event didt_a=88 didt_b=0 mode=-1 waveform=-1".to_string(),
        };
        assert_eq!(
            entry.line(),
            "2024-05-17T12:30:45.000Z\tfe 04 02 00 58 00 9a ff\tpulse_event didt_a=88 didt_b=0 mode=-1 waveform=-1"
        );
    }

    #[test]
    fn test_sink_receives_lines() {
        let buf = SharedBuf::default();
        let mut log = FrameLog::with_sink(Box::new(buf.clone()));
        log.record(Utc::now(), &[0xFE, 0x00], "unrecognized len=0");
        log.record(Utc::now(), &[0x42], "unrecognized len=1");
        assert_eq!(log.len(), 2);
        let written = buf.0.lock().unwrap();
        let text = String::from_utf8_lossy(&written);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\tfe 00\t"));
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut log = FrameLog::new();
        for i in 0..(MAX_TAIL + 10) {
            log.record(Utc::now(), &[i as u8], "x");
        }
        assert_eq!(log.len(), MAX_TAIL);
    }

    #[test]
    fn test_export_pulse_log() {
        let records = vec![PulseRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap(),
            amplitude: 55,
            didt: 90,
            mode: None,
            waveform: None,
        }];
        let mut out = Vec::new();
        export_pulse_log(&records, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"amplitude\": 55"));
        assert!(text.contains("\"didt\": 90"));
    }
}
