use std::collections::HashSet;
use std::io::Write;

use crate::error::{ExtractError, Result};
use crate::traits::RecordSink;
use crate::types::{OutputSchema, Record};

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    records: Vec<Record>,
    finish_calls: usize,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn is_finished(&self) -> bool {
        self.finish_calls > 0
    }

    /// How many times `finish` was called.
    pub fn finish_calls(&self) -> usize {
        self.finish_calls
    }
}

impl RecordSink for VecSink {
    fn add_record(&mut self, record: Record) -> Result<()> {
        if self.finish_calls > 0 {
            return Err(ExtractError::sink("record added after finish"));
        }
        self.records.push(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finish_calls += 1;
        Ok(())
    }
}

/// Writes each record as one JSON object per line.
///
/// Keys are the output column names. A repeated name gets its 0-based
/// position appended (`id`, `id_1`), bumped further while that key is
/// already taken, so every column keeps its own key.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    keys: Vec<String>,
    written: u64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W, schema: &OutputSchema) -> Self {
        let mut seen = HashSet::new();
        let keys = schema
            .columns()
            .iter()
            .map(|c| {
                let mut key = c.name.clone();
                let mut suffix = c.index;
                while seen.contains(&key) {
                    key = format!("{}_{}", c.name, suffix);
                    suffix += 1;
                }
                seen.insert(key.clone());
                key
            })
            .collect();
        Self {
            writer,
            keys,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn add_record(&mut self, record: Record) -> Result<()> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .keys
            .iter()
            .cloned()
            .zip(record.values().iter().map(|v| v.to_json()))
            .collect();
        serde_json::to_writer(&mut self.writer, &object)
            .map_err(|e| ExtractError::sink_with_source("failed to encode record", e))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| ExtractError::sink_with_source("failed to write record", e))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| ExtractError::sink_with_source("failed to flush records", e))
    }
}
