//! Trace replay and recording
//!
//! A trace is a JSON-lines file, one record per received frame. Replay hands
//! the recorded frames back in order without touching a serial port, which
//! makes captured bus sessions usable for offline debugging and tests.

use super::{TransportStats, TransportTrait, TransportType};
use crate::core::error::{Error, Result};
use crate::core::protocol::{DecodedPacket, RawFrame};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One recorded frame
///
/// Fields other than the raw frame are informational; replay ignores them
/// along with anything else a record carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Frame text including terminator
    #[serde(rename = "packetRaw", alias = "packet_raw")]
    pub packet_raw: String,
    /// When the frame was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,
    /// Decoded view at capture time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded: Option<serde_json::Value>,
}

impl TraceRecord {
    /// Record for a line received now
    pub fn new(line: &str) -> Self {
        Self {
            packet_raw: line.to_string(),
            timestamp: Some(serde_json::Value::String(Local::now().to_rfc3339())),
            decoded: None,
        }
    }

    /// Attach the decoded view of the frame
    pub fn with_decoded(mut self, packet: &DecodedPacket) -> Result<Self> {
        let decoded = serde_json::to_value(packet)
            .map_err(|e| Error::communication(format!("cannot serialize frame: {}", e)))?;
        self.decoded = Some(decoded);
        Ok(self)
    }
}

/// Replay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Trace file
    pub path: PathBuf,
    /// Log every replayed frame at info level
    pub announce: bool,
}

impl ReplayConfig {
    /// Replay `path` quietly
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            announce: false,
        }
    }

    /// Enable or disable per-frame announcements
    #[must_use]
    pub fn announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }
}

/// Transport that yields frames from a trace file
pub struct ReplayTransport {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    announce: bool,
    finished: bool,
    line_no: usize,
    stats: TransportStats,
}

impl ReplayTransport {
    /// Open a trace for replay from its first record
    pub fn open(config: &ReplayConfig) -> Result<Self> {
        let file = File::open(&config.path).map_err(|e| {
            Error::communication(format!("cannot open trace {}: {}", config.path.display(), e))
        })?;

        tracing::info!("Replaying {}", config.path.display());
        Ok(Self {
            path: config.path.clone(),
            reader: Some(BufReader::new(file)),
            announce: config.announce,
            finished: false,
            line_no: 0,
            stats: TransportStats::default(),
        })
    }

    /// Whether the trace has been exhausted
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn next_record(&mut self) -> Result<Option<TraceRecord>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut buf = String::new();
        loop {
            buf.clear();
            let read = reader.read_line(&mut buf).map_err(|e| {
                Error::communication(format!("cannot read trace {}: {}", self.path.display(), e))
            })?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let text = buf.trim();
            if text.is_empty() {
                continue;
            }
            return serde_json::from_str(text).map(Some).map_err(|e| {
                Error::communication(format!(
                    "malformed trace record at {}:{}: {}",
                    self.path.display(),
                    self.line_no,
                    e
                ))
            });
        }
    }
}

impl TransportTrait for ReplayTransport {
    fn next_line(&mut self) -> Result<String> {
        if self.finished {
            return Err(Error::SimulationComplete);
        }
        if self.reader.is_none() {
            return Err(Error::communication("replay transport closed"));
        }

        match self.next_record() {
            Ok(Some(record)) => {
                if self.announce {
                    tracing::info!(
                        target: "pfeiffer_core::replay",
                        "Simulated packet: {:?}",
                        record.packet_raw
                    );
                }
                self.stats.lines_received += 1;
                Ok(record.packet_raw)
            }
            Ok(None) => {
                tracing::debug!(
                    "Trace {} exhausted after {} frames",
                    self.path.display(),
                    self.stats.lines_received
                );
                self.finished = true;
                self.reader = None;
                Err(Error::SimulationComplete)
            }
            Err(e) => {
                self.stats.errors += 1;
                Err(e)
            }
        }
    }

    fn send(&mut self, frame: &RawFrame) -> Result<()> {
        Err(Error::communication(format!(
            "replay transport cannot transmit {:?}",
            frame.as_str()
        )))
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::info!("Closed trace {}", self.path.display());
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Replay
    }

    fn connection_info(&self) -> String {
        format!("replay of {}", self.path.display())
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

/// Writes received frames to a trace file
pub struct TraceRecorder<W: Write = BufWriter<File>> {
    writer: W,
    records: u64,
}

impl TraceRecorder<BufWriter<File>> {
    /// Create (or truncate) a trace file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        tracing::info!("Recording trace to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TraceRecorder<W> {
    /// Record into an arbitrary writer
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Append one record and flush it
    pub fn record(&mut self, record: &TraceRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|e| Error::communication(format!("cannot write trace record: {}", e)))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.records += 1;
        Ok(())
    }

    /// Record a received line, with its decoded view when available
    pub fn record_line(&mut self, line: &str, decoded: Option<&DecodedPacket>) -> Result<()> {
        let mut record = TraceRecord::new(line);
        if let Some(packet) = decoded {
            record = record.with_decoded(packet)?;
        }
        self.record(&record)
    }

    /// Number of records written
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush and hand back the writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_replay_then_complete() {
        let file = trace(&[
            r#"{"packetRaw": "0011000106111111015\r", "timestamp": "2021-03-01T10:00:00"}"#,
            "",
            r#"{"packet_raw": "0010000102=?096\r", "extra": 5}"#,
        ]);
        let mut replay = ReplayTransport::open(&ReplayConfig::new(file.path())).unwrap();

        assert_eq!(replay.next_line().unwrap(), "0011000106111111015\r");
        assert_eq!(replay.next_line().unwrap(), "0010000102=?096\r");
        assert!(replay.next_line().unwrap_err().is_simulation_complete());
        assert!(replay.next_line().unwrap_err().is_simulation_complete());
        assert!(replay.is_finished());
        assert_eq!(replay.stats().lines_received, 2);
    }

    #[test]
    fn test_malformed_record() {
        let file = trace(&[r#"{"timestamp": "x"}"#]);
        let mut replay = ReplayTransport::open(&ReplayConfig::new(file.path())).unwrap();
        let err = replay.next_line().unwrap_err();
        assert!(matches!(err, Error::Communication(ref msg) if msg.contains(":1:")));
    }

    #[test]
    fn test_replay_cannot_send() {
        let file = trace(&[]);
        let mut replay = ReplayTransport::open(&ReplayConfig::new(file.path())).unwrap();
        let catalogs = crate::core::catalog::CatalogSet::builtin().unwrap();
        let frame =
            crate::core::protocol::build_query(1, 1, catalogs.catalog("TC110").unwrap()).unwrap();
        assert!(matches!(replay.send(&frame), Err(Error::Communication(_))));
    }

    #[test]
    fn test_missing_trace() {
        let config = ReplayConfig::new("/nonexistent/trace.jsonl");
        assert!(matches!(
            ReplayTransport::open(&config),
            Err(Error::Communication(_))
        ));
    }

    #[test]
    fn test_recorder_output_replays() {
        let mut recorder = TraceRecorder::new(Vec::new());
        recorder.record_line("0011000106111111015\r", None).unwrap();
        recorder.record_line("0010000102=?096\r", None).unwrap();
        assert_eq!(recorder.records(), 2);
        let bytes = recorder.finish().unwrap();

        let text = String::from_utf8(bytes).unwrap();
        let records: Vec<TraceRecord> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].packet_raw, "0011000106111111015\r");
        assert!(records[0].timestamp.is_some());
        assert!(text.contains("\"packetRaw\""));
    }
}
