//! Per-column value conversion.
//!
//! A [`ColumnGetter`] is chosen once per result column by
//! [`ColumnGetterFactory`] and reused for every row. It reads one cell through
//! the typed accessors of [`ResultRow`] and stores the converted value in the
//! [`RecordBuilder`].
//!
//! | native type                         | getter            | output    |
//! |-------------------------------------|-------------------|-----------|
//! | BOOLEAN                             | `Boolean`         | boolean   |
//! | TINYINT, SMALLINT, INTEGER, BIGINT  | `Long`            | long      |
//! | REAL, DOUBLE                        | `Double`          | double    |
//! | NUMERIC with precision <= 18, scale 0 | `DecimalToLong` | long      |
//! | any other NUMERIC                   | `DecimalToDouble` | double    |
//! | CHAR, VARCHAR, TEXT, UUID           | `String`          | string    |
//! | DATE, TIME, TIMESTAMP               | `Date`, `Time`, `Timestamp` | timestamp |
//! | TIMESTAMPTZ                         | `TimestampTz`     | timestamp |
//! | JSON                                | `Json`            | json      |
//!
//! BINARY and driver types without a tag are rejected with
//! `ExtractError::UnsupportedType`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{ExtractError, Result};
use crate::traits::ResultRow;
use crate::types::{NativeColumn, NativeType, OutputType, RecordBuilder, ResultSchema, Value};

/// Largest NUMERIC precision whose integral values always fit in an `i64`.
const MAX_LONG_PRECISION: u32 = 18;

/// Conversion strategy for one column.
///
/// Temporal getters without a zone in the native value carry the offset their
/// wall-clock values are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnGetter {
    Boolean,
    Long,
    Double,
    /// Integral NUMERIC; values with a fraction are truncated toward zero.
    DecimalToLong,
    /// NUMERIC rounded to the nearest `f64`.
    DecimalToDouble,
    String,
    Date(FixedOffset),
    Time(FixedOffset),
    Timestamp(FixedOffset),
    TimestampTz,
    Json,
}

impl ColumnGetter {
    pub fn output_type(&self) -> OutputType {
        match self {
            Self::Boolean => OutputType::Boolean,
            Self::Long | Self::DecimalToLong => OutputType::Long,
            Self::Double | Self::DecimalToDouble => OutputType::Double,
            Self::String => OutputType::String,
            Self::Date(_) | Self::Time(_) | Self::Timestamp(_) | Self::TimestampTz => {
                OutputType::Timestamp
            }
            Self::Json => OutputType::Json,
        }
    }

    /// Read the cell at the 1-based `index` of `row` and store it at output
    /// position `index - 1`. A native NULL is stored as `Value::Null`.
    pub fn get_and_set(
        &self,
        row: &dyn ResultRow,
        index: usize,
        builder: &mut RecordBuilder,
    ) -> Result<()> {
        let position = index.checked_sub(1).ok_or_else(|| {
            ExtractError::type_conversion("column indexes start at 1")
        })?;
        let value = self.read(row, index)?.unwrap_or(Value::Null);
        builder.set(position, value)
    }

    fn read(&self, row: &dyn ResultRow, index: usize) -> Result<Option<Value>> {
        let value = match self {
            Self::Boolean => row.get_bool(index)?.map(Value::Boolean),
            Self::Long => row.get_i64(index)?.map(Value::Long),
            Self::Double => row.get_f64(index)?.map(Value::Double),
            Self::DecimalToLong => match row.get_decimal(index)? {
                Some(d) => Some(Value::Long(decimal_to_long(d, index)?)),
                None => None,
            },
            Self::DecimalToDouble => match row.get_decimal(index)? {
                Some(d) => Some(Value::Double(decimal_to_double(d, index)?)),
                None => None,
            },
            Self::String => row.get_string(index)?.map(Value::String),
            Self::Date(zone) => match row.get_date(index)? {
                Some(date) => Some(Value::Timestamp(date_to_utc(date, *zone, index)?)),
                None => None,
            },
            Self::Time(zone) => match row.get_time(index)? {
                Some(time) => {
                    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(|| {
                        ExtractError::type_conversion("epoch date is out of range")
                    })?;
                    Some(Value::Timestamp(local_to_utc(
                        epoch.and_time(time),
                        *zone,
                        index,
                    )?))
                }
                None => None,
            },
            Self::Timestamp(zone) => match row.get_timestamp(index)? {
                Some(ts) => Some(Value::Timestamp(local_to_utc(ts, *zone, index)?)),
                None => None,
            },
            Self::TimestampTz => row.get_timestamp_tz(index)?.map(Value::Timestamp),
            Self::Json => row.get_json(index)?.map(Value::Json),
        };
        Ok(value)
    }
}

fn decimal_to_long(value: Decimal, index: usize) -> Result<i64> {
    value.trunc().to_i64().ok_or_else(|| {
        ExtractError::type_conversion(format!(
            "NUMERIC value {} in column {} does not fit in a long",
            value, index
        ))
    })
}

fn decimal_to_double(value: Decimal, index: usize) -> Result<f64> {
    value.to_f64().ok_or_else(|| {
        ExtractError::type_conversion(format!(
            "NUMERIC value {} in column {} cannot be represented as a double",
            value, index
        ))
    })
}

fn date_to_utc(date: NaiveDate, zone: FixedOffset, index: usize) -> Result<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
        ExtractError::type_conversion(format!("invalid date {} in column {}", date, index))
    })?;
    local_to_utc(midnight, zone, index)
}

fn local_to_utc(local: NaiveDateTime, zone: FixedOffset, index: usize) -> Result<DateTime<Utc>> {
    local
        .and_local_timezone(zone)
        .single()
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| {
            ExtractError::type_conversion(format!(
                "timestamp {} in column {} is out of range",
                local, index
            ))
        })
}

/// Chooses the getter for each native column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnGetterFactory {
    zone: FixedOffset,
}

impl Default for ColumnGetterFactory {
    fn default() -> Self {
        Self { zone: Utc.fix() }
    }
}

impl ColumnGetterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret zoneless dates, times and timestamps in `zone`.
    pub fn with_zone(zone: FixedOffset) -> Self {
        Self { zone }
    }

    /// Like [`ColumnGetterFactory::with_zone`], with the offset east of UTC in seconds.
    pub fn from_offset_secs(secs: i32) -> Result<Self> {
        let zone = FixedOffset::east_opt(secs).ok_or_else(|| {
            ExtractError::config(format!("invalid timezone offset {} seconds", secs))
        })?;
        Ok(Self::with_zone(zone))
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    pub fn new_getter(&self, column: &NativeColumn) -> Result<ColumnGetter> {
        let getter = match &column.native_type {
            NativeType::Boolean => ColumnGetter::Boolean,
            NativeType::TinyInt
            | NativeType::SmallInt
            | NativeType::Integer
            | NativeType::BigInt => ColumnGetter::Long,
            NativeType::Real | NativeType::Double => ColumnGetter::Double,
            NativeType::Numeric => match (column.precision, column.scale) {
                (Some(precision), Some(0)) if (1..=MAX_LONG_PRECISION).contains(&precision) => {
                    ColumnGetter::DecimalToLong
                }
                _ => ColumnGetter::DecimalToDouble,
            },
            NativeType::Char | NativeType::Varchar | NativeType::Text | NativeType::Uuid => {
                ColumnGetter::String
            }
            NativeType::Date => ColumnGetter::Date(self.zone),
            NativeType::Time => ColumnGetter::Time(self.zone),
            NativeType::Timestamp => ColumnGetter::Timestamp(self.zone),
            NativeType::TimestampTz => ColumnGetter::TimestampTz,
            NativeType::Json => ColumnGetter::Json,
            NativeType::Binary | NativeType::Other(_) => {
                return Err(ExtractError::UnsupportedType {
                    column: column.name.clone(),
                    type_name: column.type_name.clone(),
                })
            }
        };
        Ok(getter)
    }

    /// One getter per column, in schema order.
    pub fn new_getters(&self, schema: &ResultSchema) -> Result<Vec<ColumnGetter>> {
        schema.columns().iter().map(|c| self.new_getter(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NativeValue, OutputColumn, OutputSchema};
    use chrono::{NaiveTime, TimeZone};

    /// Row backed by native values, reading them the way a lenient driver would.
    struct TestRow(Vec<NativeValue>);

    impl TestRow {
        fn cell(&self, index: usize) -> &NativeValue {
            &self.0[index - 1]
        }

        fn mismatch<T>(&self, index: usize, wanted: &str) -> Result<Option<T>> {
            Err(ExtractError::type_conversion(format!(
                "column {} is not {}",
                index, wanted
            )))
        }
    }

    impl ResultRow for TestRow {
        fn get_bool(&self, index: usize) -> Result<Option<bool>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Bool(b) => Ok(Some(*b)),
                _ => self.mismatch(index, "bool"),
            }
        }
        fn get_i64(&self, index: usize) -> Result<Option<i64>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Int(n) => Ok(Some(*n)),
                _ => self.mismatch(index, "integer"),
            }
        }
        fn get_f64(&self, index: usize) -> Result<Option<f64>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Float(n) => Ok(Some(*n)),
                _ => self.mismatch(index, "float"),
            }
        }
        fn get_decimal(&self, index: usize) -> Result<Option<Decimal>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Decimal(d) => Ok(Some(*d)),
                _ => self.mismatch(index, "decimal"),
            }
        }
        fn get_string(&self, index: usize) -> Result<Option<String>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Text(s) => Ok(Some(s.clone())),
                _ => self.mismatch(index, "text"),
            }
        }
        fn get_date(&self, index: usize) -> Result<Option<NaiveDate>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Date(d) => Ok(Some(*d)),
                _ => self.mismatch(index, "date"),
            }
        }
        fn get_time(&self, index: usize) -> Result<Option<NaiveTime>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Time(t) => Ok(Some(*t)),
                _ => self.mismatch(index, "time"),
            }
        }
        fn get_timestamp(&self, index: usize) -> Result<Option<NaiveDateTime>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Timestamp(t) => Ok(Some(*t)),
                _ => self.mismatch(index, "timestamp"),
            }
        }
        fn get_timestamp_tz(&self, index: usize) -> Result<Option<DateTime<Utc>>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::TimestampTz(t) => Ok(Some(*t)),
                _ => self.mismatch(index, "timestamptz"),
            }
        }
        fn get_json(&self, index: usize) -> Result<Option<serde_json::Value>> {
            match self.cell(index) {
                NativeValue::Null => Ok(None),
                NativeValue::Json(j) => Ok(Some(j.clone())),
                _ => self.mismatch(index, "json"),
            }
        }
    }

    fn convert(getter: ColumnGetter, cell: NativeValue) -> Result<Value> {
        let schema = OutputSchema::new(vec![OutputColumn {
            index: 0,
            name: "c".to_string(),
            output_type: getter.output_type(),
        }]);
        let mut builder = RecordBuilder::new(&schema);
        getter.get_and_set(&TestRow(vec![cell]), 1, &mut builder)?;
        Ok(builder.build().into_values().remove(0))
    }

    #[test]
    fn test_getter_selection() {
        let factory = ColumnGetterFactory::default();
        let pick = |t: NativeType| factory.new_getter(&NativeColumn::new("c", t)).unwrap();

        assert_eq!(pick(NativeType::Boolean), ColumnGetter::Boolean);
        assert_eq!(pick(NativeType::SmallInt), ColumnGetter::Long);
        assert_eq!(pick(NativeType::BigInt), ColumnGetter::Long);
        assert_eq!(pick(NativeType::Real), ColumnGetter::Double);
        assert_eq!(pick(NativeType::Varchar), ColumnGetter::String);
        assert_eq!(pick(NativeType::Uuid), ColumnGetter::String);
        assert_eq!(pick(NativeType::TimestampTz), ColumnGetter::TimestampTz);
        assert_eq!(pick(NativeType::Json), ColumnGetter::Json);
        assert_eq!(pick(NativeType::Date), ColumnGetter::Date(Utc.fix()));
    }

    #[test]
    fn test_numeric_policy() {
        let factory = ColumnGetterFactory::default();
        let numeric = |p: u32, s: u32| {
            factory
                .new_getter(&NativeColumn::new("n", NativeType::Numeric).with_precision(p, s))
                .unwrap()
        };
        assert_eq!(numeric(10, 0), ColumnGetter::DecimalToLong);
        assert_eq!(numeric(18, 0), ColumnGetter::DecimalToLong);
        assert_eq!(numeric(19, 0), ColumnGetter::DecimalToDouble);
        assert_eq!(numeric(10, 2), ColumnGetter::DecimalToDouble);
        assert_eq!(
            factory
                .new_getter(&NativeColumn::new("n", NativeType::Numeric))
                .unwrap(),
            ColumnGetter::DecimalToDouble
        );
    }

    #[test]
    fn test_unsupported_types() {
        let factory = ColumnGetterFactory::default();
        let err = factory
            .new_getter(&NativeColumn::new("blob", NativeType::Binary).with_type_name("bytea"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType { .. }));
        assert!(factory
            .new_getter(&NativeColumn::new("x", NativeType::Other("xml".into())))
            .is_err());
    }

    #[test]
    fn test_null_becomes_output_null() {
        for getter in [
            ColumnGetter::Boolean,
            ColumnGetter::Long,
            ColumnGetter::DecimalToDouble,
            ColumnGetter::String,
            ColumnGetter::Timestamp(Utc.fix()),
            ColumnGetter::Json,
        ] {
            assert_eq!(convert(getter, NativeValue::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_decimal_conversions() {
        let d = Decimal::new(12350, 2); // 123.50
        assert_eq!(
            convert(ColumnGetter::DecimalToDouble, d.into()).unwrap(),
            Value::Double(123.5)
        );
        assert_eq!(
            convert(ColumnGetter::DecimalToLong, d.into()).unwrap(),
            Value::Long(123)
        );
        assert_eq!(
            convert(ColumnGetter::DecimalToLong, Decimal::new(-987, 1).into()).unwrap(),
            Value::Long(-98)
        );
    }

    #[test]
    fn test_temporal_conversions_use_zone() {
        let zone = FixedOffset::east_opt(2 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            convert(ColumnGetter::Date(zone), date.into()).unwrap(),
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 2, 29, 22, 0, 0).unwrap())
        );

        let ts = date.and_hms_opt(10, 15, 0).unwrap();
        assert_eq!(
            convert(ColumnGetter::Timestamp(Utc.fix()), ts.into()).unwrap(),
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap())
        );

        let time = NaiveTime::from_hms_opt(6, 30, 0).unwrap();
        assert_eq!(
            convert(ColumnGetter::Time(Utc.fix()), time.into()).unwrap(),
            Value::Timestamp(Utc.with_ymd_and_hms(1970, 1, 1, 6, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_mismatched_cell_is_conversion_error() {
        let err = convert(ColumnGetter::Long, NativeValue::Text("x".into())).unwrap_err();
        assert!(matches!(err, ExtractError::TypeConversion(_)));
    }

    #[test]
    fn test_offset_validation() {
        assert!(ColumnGetterFactory::from_offset_secs(9 * 3600).is_ok());
        assert!(ColumnGetterFactory::from_offset_secs(100_000).is_err());
    }
}
