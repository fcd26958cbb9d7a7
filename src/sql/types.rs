//! SQL to CQL type mapping.

use crate::schema::RelationalSchema;
use crate::warning::Warning;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Native CQL column types the converter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CqlType {
    Uuid,
    Text,
    Int,
    Bigint,
    Smallint,
    Tinyint,
    Float,
    Double,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    Time,
    Blob,
}

impl CqlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Text => "text",
            Self::Int => "int",
            Self::Bigint => "bigint",
            Self::Smallint => "smallint",
            Self::Tinyint => "tinyint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Time => "time",
            Self::Blob => "blob",
        }
    }
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a relational type to CQL. `None` means the type is not recognised.
pub fn map_type(sql_type: &str) -> Option<CqlType> {
    let lower = sql_type.trim().to_lowercase();
    let base = lower.split('(').next().unwrap_or(&lower).trim();

    let mapped = match base {
        "uuid" => CqlType::Uuid,

        // Integer types
        "int" | "integer" => CqlType::Int,
        "bigint" => CqlType::Bigint,
        "smallint" => CqlType::Smallint,
        "tinyint" => CqlType::Tinyint,

        // Floating point and exact numerics
        "float" | "real" => CqlType::Float,
        "double" | "double precision" => CqlType::Double,
        "decimal" | "numeric" => CqlType::Decimal,

        // String types
        "varchar" | "character varying" | "char" | "character" | "text" | "string" => {
            CqlType::Text
        }

        // Date/time
        "timestamp" | "datetime" => CqlType::Timestamp,
        "date" => CqlType::Date,
        "time" => CqlType::Time,

        "boolean" | "bool" => CqlType::Boolean,

        "blob" | "bytea" => CqlType::Blob,

        _ => return None,
    };
    Some(mapped)
}

/// CQL types of every relational column, resolved once per run.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: HashMap<(String, String), CqlType>,
}

impl TypeTable {
    /// Map every column of the schema, recording a warning for each
    /// unsupported type in declaration order.
    pub fn build(schema: &RelationalSchema, warnings: &mut Vec<Warning>) -> Self {
        let mut types = HashMap::new();

        for table in schema.tables() {
            for column in &table.columns {
                let cql = match map_type(&column.data_type) {
                    Some(t) => t,
                    None => {
                        log::warn!(
                            "unsupported type '{}' on {}.{}, using text",
                            column.data_type,
                            table.name,
                            column.name
                        );
                        warnings.push(Warning::UnsupportedType {
                            table: table.name.clone(),
                            column: column.name.clone(),
                            original: column.data_type.clone(),
                        });
                        CqlType::Text
                    }
                };
                types.insert(
                    (table.name.to_ascii_lowercase(), column.name.to_ascii_lowercase()),
                    cql,
                );
            }
        }

        Self { types }
    }

    pub fn get(&self, table: &str, column: &str) -> CqlType {
        self.types
            .get(&(table.to_ascii_lowercase(), column.to_ascii_lowercase()))
            .copied()
            .unwrap_or(CqlType::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::schema_from_json;
    use test_case::test_case;

    #[test_case("uuid", CqlType::Uuid)]
    #[test_case("VARCHAR(255)", CqlType::Text)]
    #[test_case("text", CqlType::Text)]
    #[test_case("INT", CqlType::Int)]
    #[test_case("decimal(10,2)", CqlType::Decimal)]
    #[test_case("boolean", CqlType::Boolean)]
    #[test_case("timestamp", CqlType::Timestamp)]
    #[test_case("date", CqlType::Date)]
    #[test_case("bigint", CqlType::Bigint)]
    #[test_case("datetime", CqlType::Timestamp)]
    #[test_case("double precision", CqlType::Double)]
    fn test_known_types(input: &str, expected: CqlType) {
        assert_eq!(map_type(input), Some(expected));
    }

    #[test_case("jsonb")]
    #[test_case("geometry(Point, 4326)")]
    #[test_case("")]
    fn test_unknown_types(input: &str) {
        assert_eq!(map_type(input), None);
    }

    #[test]
    fn test_type_table_records_warnings_in_declaration_order() {
        let schema = schema_from_json(
            r#"{"tables": [
                {"name": "a", "columns": [
                    {"name": "id", "type": "int", "primary_key": true},
                    {"name": "doc", "type": "jsonb"}
                ]},
                {"name": "b", "columns": [
                    {"name": "id", "type": "serial", "primary_key": true}
                ]}
            ]}"#,
        );
        let mut warnings = Vec::new();
        let types = TypeTable::build(&schema, &mut warnings);

        assert_eq!(types.get("a", "id"), CqlType::Int);
        assert_eq!(types.get("A", "DOC"), CqlType::Text);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(&warnings[0], Warning::UnsupportedType { column, .. } if column == "doc"));
        assert!(matches!(&warnings[1], Warning::UnsupportedType { table, .. } if table == "b"));
    }
}
