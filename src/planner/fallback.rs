//! Naive per-entity tables for relational tables no query drives.

use crate::ir::{LogicalColumn, LogicalTable, Provenance, TableOrigin};
use crate::schema::{RelationalSchema, Table};
use crate::sql::TypeTable;
use std::collections::BTreeSet;

/// One table per relational table whose name is not in `driven`, in
/// declaration order.
pub fn fallback_tables(
    schema: &RelationalSchema,
    types: &TypeTable,
    driven: &BTreeSet<String>,
) -> Vec<LogicalTable> {
    schema
        .tables()
        .iter()
        .enumerate()
        .filter(|(_, table)| !driven.contains(&table.name.to_ascii_lowercase()))
        .map(|(declaration_index, table)| {
            log::debug!("fallback table for {}", table.name);
            entity_table(table, types, declaration_index)
        })
        .collect()
}

/// The relational table as-is: its primary key is the partition key and
/// every other column is a regular column.
pub fn entity_table(table: &Table, types: &TypeTable, declaration_index: usize) -> LogicalTable {
    let column = |name: &str| LogicalColumn {
        name: name.to_string(),
        provenance: Provenance::direct(&table.name, name),
        cql_type: types.get(&table.name, name),
        is_static: false,
    };

    let mut key_names = table.primary_key_names();
    if key_names.is_empty() {
        // Without a declared key the first column has to carry the partition.
        key_names = table.columns.iter().take(1).map(|c| c.name.as_str()).collect();
    }

    LogicalTable {
        name: table.name.clone(),
        driving_table: table.name.clone(),
        origin: TableOrigin::Fallback { declaration_index },
        partition_key: key_names.iter().map(|k| column(k)).collect(),
        clustering_key: Vec::new(),
        regular_columns: table
            .columns
            .iter()
            .filter(|c| !key_names.iter().any(|k| k.eq_ignore_ascii_case(&c.name)))
            .map(|c| column(&c.name))
            .collect(),
        collections: Vec::new(),
        serving: BTreeSet::new(),
        decisions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::schema_from_json;

    #[test]
    fn test_only_undriven_tables_fall_back() {
        let schema = schema_from_json(
            r#"{"tables": [
                {"name": "users", "columns": [
                    {"name": "user_id", "type": "uuid", "primary_key": true},
                    {"name": "email", "type": "text"}
                ]},
                {"name": "audit_log", "columns": [
                    {"name": "entry", "type": "text"},
                    {"name": "at", "type": "timestamp"}
                ]}
            ]}"#,
        );
        let types = TypeTable::build(&schema, &mut Vec::new());
        let driven = BTreeSet::from(["users".to_string()]);

        let tables = fallback_tables(&schema, &types, &driven);
        assert_eq!(tables.len(), 1);
        let audit = &tables[0];
        assert_eq!(audit.name, "audit_log");
        assert_eq!(audit.origin, TableOrigin::Fallback { declaration_index: 1 });
        assert_eq!(audit.partition_key[0].name, "entry");
        assert_eq!(audit.regular_columns.len(), 1);
        assert_eq!(audit.regular_columns[0].name, "at");
    }
}
