mod driver;
mod row;
mod sink;

pub use driver::{Driver, RawConnection, RawCursor};
pub use row::ResultRow;
pub use sink::RecordSink;
