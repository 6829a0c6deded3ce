//! Result schema introspection and output schema derivation.

use tracing::debug;

use crate::error::{ExtractError, Result};
use crate::getters::{ColumnGetter, ColumnGetterFactory};
use crate::traits::RawConnection;
use crate::types::{OutputColumn, OutputSchema, ResultSchema};

/// Describe `query` on `conn` without consuming any row.
pub async fn introspect(conn: &dyn RawConnection, query: &str) -> Result<ResultSchema> {
    let columns = conn.describe(query).await.map_err(|e| match e {
        ExtractError::Schema { .. } => e,
        other => ExtractError::schema_with_source("failed to describe query", other),
    })?;
    debug!(columns = columns.len(), "described query");
    Ok(ResultSchema::new(columns))
}

/// Select one getter per result column and derive the output schema from them.
///
/// The output schema has the same length and order as `schema`. Fails with
/// `UnsupportedType` on the first column without a getter.
pub fn resolve_output_schema(
    schema: &ResultSchema,
    factory: &ColumnGetterFactory,
) -> Result<(OutputSchema, Vec<ColumnGetter>)> {
    let getters = factory.new_getters(schema)?;
    let columns = schema
        .columns()
        .iter()
        .zip(&getters)
        .enumerate()
        .map(|(index, (column, getter))| OutputColumn {
            index,
            name: column.name.clone(),
            output_type: getter.output_type(),
        })
        .collect();
    Ok((OutputSchema::new(columns), getters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NativeColumn, NativeType, OutputType};

    #[test]
    fn test_output_schema_preserves_order_and_length() {
        let schema = ResultSchema::new(vec![
            NativeColumn::new("b", NativeType::Text),
            NativeColumn::new("a", NativeType::BigInt),
            NativeColumn::new("a", NativeType::Double),
            NativeColumn::new("ts", NativeType::TimestampTz),
        ]);
        let (output, getters) =
            resolve_output_schema(&schema, &ColumnGetterFactory::default()).unwrap();

        assert_eq!(output.len(), schema.len());
        assert_eq!(getters.len(), schema.len());
        assert_eq!(output.names(), vec!["b", "a", "a", "ts"]);
        let types: Vec<OutputType> = output.columns().iter().map(|c| c.output_type).collect();
        assert_eq!(
            types,
            vec![
                OutputType::String,
                OutputType::Long,
                OutputType::Double,
                OutputType::Timestamp
            ]
        );
        assert_eq!(output.columns()[3].index, 3);
    }

    #[test]
    fn test_unsupported_column_fails_resolution() {
        let schema = ResultSchema::new(vec![
            NativeColumn::new("id", NativeType::Integer),
            NativeColumn::new("shape", NativeType::Other("geometry".to_string()))
                .with_type_name("geometry"),
        ]);
        let err = resolve_output_schema(&schema, &ColumnGetterFactory::default()).unwrap_err();
        match err {
            ExtractError::UnsupportedType { column, type_name } => {
                assert_eq!(column, "shape");
                assert_eq!(type_name, "geometry");
            }
            other => panic!("Expected UnsupportedType error, got {:?}", other),
        }
    }
}
