use crate::error::Result;
use crate::types::Record;

/// Destination for converted records.
/// Paging and buffering are up to the implementation.
pub trait RecordSink: Send {
    /// Append one record conforming to the published output schema.
    fn add_record(&mut self, record: Record) -> Result<()>;

    /// Flush and finalize. Called once, after the fetch loop has run to exhaustion.
    fn finish(&mut self) -> Result<()>;
}
