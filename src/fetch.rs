use tracing::info;

use crate::cursor::BatchCursor;
use crate::error::{ExtractError, Result};
use crate::getters::ColumnGetter;
use crate::traits::RecordSink;
use crate::types::{OutputSchema, RecordBuilder};

/// Record count of the first progress log.
const INITIAL_REPORT_ROWS: u64 = 500;

/// Logs progress at 500, 1000, 2000, ... records.
///
/// Thresholds are cumulative over one run; they do not restart for each
/// fetched batch.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    next_report: u64,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            next_report: INITIAL_REPORT_ROWS,
        }
    }

    /// Note that `total` records were emitted so far.
    /// Returns whether a progress line was logged.
    pub fn record(&mut self, total: u64) -> bool {
        if total < self.next_report {
            return false;
        }
        info!(rows = total, "Fetched {} rows", total);
        self.next_report = self.next_report.saturating_mul(2);
        true
    }

    /// Record count at which the next progress line is logged.
    pub fn next_report(&self) -> u64 {
        self.next_report
    }

    pub fn reset(&mut self) {
        self.next_report = INITIAL_REPORT_ROWS;
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts fetched rows into records and hands them to a sink.
pub struct FetchLoop {
    getters: Vec<ColumnGetter>,
    builder: RecordBuilder,
    progress: ProgressReporter,
}

impl FetchLoop {
    /// `getters` must line up with `schema`, one per output column.
    pub fn new(getters: Vec<ColumnGetter>, schema: &OutputSchema) -> Result<Self> {
        if getters.len() != schema.len() {
            return Err(ExtractError::config(format!(
                "{} column getters for {} output columns",
                getters.len(),
                schema.len()
            )));
        }
        Ok(Self {
            getters,
            builder: RecordBuilder::new(schema),
            progress: ProgressReporter::new(),
        })
    }

    /// Fetch batches until the cursor is exhausted, appending one record per row.
    ///
    /// Returns the number of records appended. The sink is not finished here.
    /// Any conversion or sink failure aborts the loop. Each call starts from
    /// an empty record and fresh progress thresholds.
    pub async fn run(&mut self, cursor: &mut BatchCursor, sink: &mut dyn RecordSink) -> Result<u64> {
        self.builder.clear();
        self.progress.reset();
        let mut records = 0u64;
        while let Some(batch) = cursor.fetch().await? {
            for row in batch.rows() {
                for (i, getter) in self.getters.iter().enumerate() {
                    // result columns are 1-based
                    getter.get_and_set(row, i + 1, &mut self.builder)?;
                }
                sink.add_record(self.builder.build())?;
                records += 1;
                self.progress.record(records);
            }
        }
        Ok(records)
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }
}
