mod native;
mod native_value;
mod record;

pub use native::{NativeColumn, NativeType, ResultSchema};
pub use native_value::NativeValue;
pub use record::{OutputColumn, OutputSchema, OutputType, Record, RecordBuilder, Value};
