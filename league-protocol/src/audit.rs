//! Append-only audit log: every protocol message, accepted or rejected,
//! as a newline-delimited JSON file next to the database (spec §4.8/§6).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    Rejected { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub from: String,
    pub to: String,
    pub envelope: Value,
    pub payload: Value,
    pub outcome: Outcome,
}

/// Append-only, line-buffered NDJSON audit log. One writer per service
/// process, opened once at startup (spec §9 "scoped acquisition") and
/// flushed after every record so a crash loses at most the in-flight line.
pub struct AuditLog {
    file: Mutex<File>,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one record. Never fails the originating request: logging
    /// failures are only traced, per spec §4.8 ("every message...is
    /// logged") being a best-effort side channel, not a precondition of
    /// the protocol response.
    pub fn record(&self, record: &AuditRecord) {
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize audit record");
                return;
            }
        };
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{line}") {
            tracing::error!(error = %e, "failed to append audit record");
        } else if let Err(e) = file.flush() {
            tracing::error!(error = %e, "failed to flush audit log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    #[test]
    fn appends_one_line_per_record_even_on_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.ndjson");
        let log = AuditLog::open(&path).unwrap();

        log.record(&AuditRecord {
            timestamp: Utc::now(),
            direction: Direction::In,
            from: "player:p1".to_string(),
            to: "league_manager".to_string(),
            envelope: serde_json::json!({"message_type": "QUERY_STANDINGS"}),
            payload: serde_json::json!({}),
            outcome: Outcome::Rejected {
                reason: "AUTH_REQUIRED".to_string(),
            },
        });
        log.record(&AuditRecord {
            timestamp: Utc::now(),
            direction: Direction::Out,
            from: "league_manager".to_string(),
            to: "player:p1".to_string(),
            envelope: serde_json::json!({"message_type": "ERROR"}),
            payload: serde_json::json!({}),
            outcome: Outcome::Accepted,
        });

        let reader = BufReader::new(File::open(&path).unwrap());
        let lines: Vec<_> = reader.lines().collect::<Result<_, _>>().unwrap();
        assert_eq!(lines.len(), 2);
        let first: AuditRecord = serde_json::from_str(&lines[0]).unwrap();
        assert!(matches!(first.outcome, Outcome::Rejected { .. }));
    }
}
