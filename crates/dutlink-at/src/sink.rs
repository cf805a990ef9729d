//! Observation hook for protocol traffic.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Which way a piece of traffic travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tx => f.write_str("TX"),
            Self::Rx => f.write_str("RX"),
        }
    }
}

/// Receives every outbound command and every inbound chunk.
///
/// Purely observational: nothing a sink does affects the protocol.
pub trait TrafficSink {
    fn record(&self, direction: Direction, text: &str);
}

/// Emits traffic as `tracing` debug events under the `dutlink::traffic` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TrafficSink for TracingSink {
    fn record(&self, direction: Direction, text: &str) {
        debug!(target: "dutlink::traffic", "{direction}: {text}");
    }
}

/// Keeps traffic in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<(Direction, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<(Direction, String)> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TrafficSink for RecordingSink {
    fn record(&self, direction: Direction, text: &str) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push((direction, text.to_string()));
    }
}

/// Render a received chunk with each newline marker shown as a literal `\n`.
pub(crate) fn collapse_newlines(chunk: &[u8], newline: &str) -> String {
    String::from_utf8_lossy(chunk).replace(newline, "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_crlf() {
        assert_eq!(collapse_newlines(b"line1\r\nOK\r\n", "\r\n"), "line1\\nOK\\n");
    }

    #[test]
    fn collapse_leaves_partial_marker() {
        assert_eq!(collapse_newlines(b"abc\r", "\r\n"), "abc\r");
    }

    #[test]
    fn recording_sink_clones_share_entries() {
        let sink = RecordingSink::new();
        let observer = sink.clone();

        sink.record(Direction::Tx, "AT");
        sink.record(Direction::Rx, "OK\\n");

        assert_eq!(
            observer.entries(),
            vec![
                (Direction::Tx, "AT".to_string()),
                (Direction::Rx, "OK\\n".to_string())
            ]
        );
    }
}
