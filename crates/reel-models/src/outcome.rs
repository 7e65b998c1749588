//! Per-row outcomes and the result table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};
use crate::row::{InputRow, RowIdentity};

/// Classification of a per-row failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Page unreachable or screenshot failed
    Capture,
    /// No overlay clip available for the row's category
    MissingOverlay,
    /// Both hardware and software encodes failed
    Encode,
    /// Upload retries exhausted
    Transport,
    /// Local I/O or unexpected error
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Capture => "capture",
            FailureKind::MissingOverlay => "missing_overlay",
            FailureKind::Encode => "encode",
            FailureKind::Transport => "transport",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed {
        video_url: String,
        landing_url: String,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
    Skipped,
}

/// Outcome of processing one row. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub identity: RowIdentity,
    pub url: String,
    pub category: String,
    pub status: OutcomeStatus,
}

impl Outcome {
    pub fn completed(
        row: &InputRow,
        video_url: impl Into<String>,
        landing_url: impl Into<String>,
    ) -> Self {
        Self::with_status(
            row,
            OutcomeStatus::Completed {
                video_url: video_url.into(),
                landing_url: landing_url.into(),
            },
        )
    }

    pub fn failed(row: &InputRow, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::with_status(
            row,
            OutcomeStatus::Failed {
                kind,
                reason: reason.into(),
            },
        )
    }

    pub fn skipped(row: &InputRow) -> Self {
        Self::with_status(row, OutcomeStatus::Skipped)
    }

    fn with_status(row: &InputRow, status: OutcomeStatus) -> Self {
        Self {
            identity: row.identity.clone(),
            url: row.url.clone(),
            category: row.category.clone(),
            status,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped)
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        match &self.status {
            OutcomeStatus::Completed { landing_url, .. } => {
                format!("{} -> {}", self.identity, landing_url)
            }
            OutcomeStatus::Failed { kind, reason } => {
                format!("{} failed ({}): {}", self.identity, kind, reason)
            }
            OutcomeStatus::Skipped => format!("{} skipped (already published)", self.identity),
        }
    }

    /// Flatten into a result-table record.
    pub fn to_record(&self) -> OutcomeRecord {
        let (status, link, video, detail) = match &self.status {
            OutcomeStatus::Completed {
                video_url,
                landing_url,
            } => (
                RecordStatus::Completed,
                landing_url.clone(),
                video_url.clone(),
                String::new(),
            ),
            OutcomeStatus::Failed { kind, reason } => (
                RecordStatus::Failed,
                String::new(),
                String::new(),
                format!("{}: {}", kind, reason),
            ),
            OutcomeStatus::Skipped => (
                RecordStatus::Skipped,
                String::new(),
                String::new(),
                String::new(),
            ),
        };

        OutcomeRecord {
            url: self.url.clone(),
            identity: self.identity.to_string(),
            category: self.category.clone(),
            status,
            link,
            video,
            detail,
        }
    }
}

/// Status column of the result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Completed,
    Failed,
    Skipped,
}

/// One row of a worker or master result file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub url: String,
    pub identity: String,
    pub category: String,
    pub status: RecordStatus,
    /// Landing page URL for completed rows
    #[serde(default)]
    pub link: String,
    /// Video URL for completed rows
    #[serde(default)]
    pub video: String,
    /// Failure reason for failed rows
    #[serde(default)]
    pub detail: String,
}

/// Serialize records as CSV (with header).
pub fn write_records(records: &[OutcomeRecord]) -> ModelResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    // An empty table still gets a header so downstream tools see the shape.
    if records.is_empty() {
        writer.write_record(["url", "identity", "category", "status", "link", "video", "detail"])?;
    }
    writer.into_inner().map_err(|e| ModelError::Io(e.into_error()))
}

/// Parse records written by [`write_records`].
pub fn read_records(data: &[u8]) -> ModelResult<Vec<OutcomeRecord>> {
    let mut reader = csv::Reader::from_reader(data);
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> InputRow {
        InputRow::new(&format!("https://{}.com", id), Some(id), "tech").unwrap()
    }

    #[test]
    fn test_outcome_records() {
        let done = Outcome::completed(&row("apple"), "https://cdn/v.mp4", "https://cdn/i.html");
        let record = done.to_record();
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.link, "https://cdn/i.html");
        assert_eq!(record.video, "https://cdn/v.mp4");

        let failed = Outcome::failed(&row("nike"), FailureKind::Capture, "timeout");
        let record = failed.to_record();
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.detail, "capture: timeout");
        assert!(failed.summary().contains("capture"));
    }

    #[test]
    fn test_csv_table() {
        let records = vec![
            Outcome::completed(&row("a"), "v", "l").to_record(),
            Outcome::failed(&row("b"), FailureKind::Encode, "both, encoders \"failed\"").to_record(),
            Outcome::skipped(&row("c")).to_record(),
        ];

        let bytes = write_records(&records).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("url,identity,category,status,link,video,detail"));

        assert_eq!(read_records(&bytes).unwrap(), records);
    }

    #[test]
    fn test_empty_table_has_header() {
        let bytes = write_records(&[]).unwrap();
        assert!(read_records(&bytes).unwrap().is_empty());
        assert!(String::from_utf8(bytes).unwrap().starts_with("url,"));
    }
}
