//! Structured row logging utilities.
//!
//! Provides consistent, structured logging for per-row processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use reel_models::{InputRow, Outcome, OutcomeStatus};

/// Row logger for structured logging with consistent formatting.
///
/// Every line carries the worker index, the row position and the row
/// identity, so interleaved logs from many workers stay attributable.
#[derive(Debug, Clone)]
pub struct RowLogger {
    worker: u32,
    position: usize,
    identity: String,
}

impl RowLogger {
    /// Create a logger for the row at `position` in the input list.
    pub fn new(worker: u32, position: usize, row: &InputRow) -> Self {
        Self {
            worker,
            position,
            identity: row.identity.to_string(),
        }
    }

    pub fn log_start(&self, url: &str) {
        info!(
            worker = self.worker,
            row = self.position,
            identity = %self.identity,
            "Row started: {}", url
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            worker = self.worker,
            row = self.position,
            identity = %self.identity,
            "Row progress: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            worker = self.worker,
            row = self.position,
            identity = %self.identity,
            "Row error: {}", message
        );
    }

    /// The one summary line per row.
    pub fn log_outcome(&self, outcome: &Outcome, elapsed_secs: f64, run_elapsed_secs: f64) {
        let status = match &outcome.status {
            OutcomeStatus::Completed { .. } => "completed",
            OutcomeStatus::Failed { .. } => "failed",
            OutcomeStatus::Skipped => "skipped",
        };
        let line = format!(
            "{} [{:.1}s, total {:.0}s]",
            outcome.summary(),
            elapsed_secs,
            run_elapsed_secs
        );
        if outcome.is_failed() {
            warn!(
                worker = self.worker,
                row = self.position,
                identity = %self.identity,
                status,
                "{}", line
            );
        } else {
            info!(
                worker = self.worker,
                row = self.position,
                identity = %self.identity,
                status,
                "{}", line
            );
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Span wrapping the whole row.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "row",
            worker = self.worker,
            row = self.position,
            identity = %self.identity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_logger_creation() {
        let row = InputRow::new("https://apple.com", Some("Apple"), "tech").unwrap();
        let logger = RowLogger::new(2, 14, &row);

        assert_eq!(logger.identity(), "apple");
        assert_eq!(logger.position(), 14);
    }
}
