use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;

use crate::error::Result;

/// Typed access to the cells of one fetched row.
///
/// Indexes are 1-based, matching the column positions reported by `describe`.
/// Every getter returns `Ok(None)` for a native NULL. Drivers widen their
/// narrower native representations (e.g. a 16-bit integer through `get_i64`)
/// and fail with `ExtractError::TypeConversion` when the cell cannot be read
/// as the requested type.
pub trait ResultRow: Send + Sync {
    fn get_bool(&self, index: usize) -> Result<Option<bool>>;
    fn get_i64(&self, index: usize) -> Result<Option<i64>>;
    fn get_f64(&self, index: usize) -> Result<Option<f64>>;
    fn get_decimal(&self, index: usize) -> Result<Option<Decimal>>;
    fn get_string(&self, index: usize) -> Result<Option<String>>;
    fn get_date(&self, index: usize) -> Result<Option<NaiveDate>>;
    fn get_time(&self, index: usize) -> Result<Option<NaiveTime>>;
    fn get_timestamp(&self, index: usize) -> Result<Option<NaiveDateTime>>;
    fn get_timestamp_tz(&self, index: usize) -> Result<Option<DateTime<Utc>>>;
    fn get_json(&self, index: usize) -> Result<Option<serde_json::Value>>;
}
