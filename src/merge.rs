//! Table merger: tables with the same key structure become one table.

use crate::ir::{CollectionColumn, KeySignature, LogicalColumn, LogicalTable};
use crate::planner::naming::assign_table_names;

/// Merge key-equivalent tables, order them for emission and give them
/// their final names. Applying it to its own output changes nothing.
pub fn merge_tables(tables: Vec<LogicalTable>) -> Vec<LogicalTable> {
    let mut merged: Vec<(KeySignature, LogicalTable)> = Vec::with_capacity(tables.len());

    let mut ordered = tables;
    ordered.sort_by_key(LogicalTable::emission_key);

    for table in ordered {
        let signature = table.key_signature();
        match merged
            .iter_mut()
            .find(|(s, t)| *s == signature && t.origin == table.origin)
        {
            Some((_, target)) => {
                log::debug!("merging {} into {}", table.name, target.name);
                absorb(target, table);
            }
            None => merged.push((signature, table)),
        }
    }

    let mut tables: Vec<LogicalTable> = merged.into_iter().map(|(_, t)| t).collect();
    tables.sort_by_key(LogicalTable::emission_key);

    let bases: Vec<String> = tables.iter().map(LogicalTable::base_name).collect();
    for (table, name) in tables.iter_mut().zip(assign_table_names(&bases)) {
        table.name = name;
    }

    log::info!("{} logical tables after merging", tables.len());
    tables
}

fn absorb(target: &mut LogicalTable, other: LogicalTable) {
    for column in other.regular_columns {
        add_regular(target, column);
    }
    for collection in other.collections {
        add_collection(target, collection);
    }
    for decision in other.decisions {
        if !target.decisions.contains(&decision) {
            target.decisions.push(decision);
        }
    }
    target.serving.extend(other.serving);
}

fn add_regular(target: &mut LogicalTable, column: LogicalColumn) {
    if target
        .regular_columns
        .iter()
        .any(|c| c.provenance == column.provenance)
    {
        return;
    }
    let name = free_name(target, &column.name);
    target.regular_columns.push(LogicalColumn { name, ..column });
}

fn add_collection(target: &mut LogicalTable, collection: CollectionColumn) {
    if target
        .collections
        .iter()
        .any(|c| c.kind == collection.kind && c.elements == collection.elements)
    {
        return;
    }
    let name = free_name(target, &collection.name);
    target.collections.push(CollectionColumn { name, ..collection });
}

fn free_name(target: &LogicalTable, wanted: &str) -> String {
    let taken = |name: &str| {
        target
            .column_names()
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
    };
    if !taken(wanted) {
        return wanted.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", wanted, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| wanted.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ClusteringColumn, Provenance, TableOrigin};
    use crate::sql::{CqlType, SortOrder};
    use std::collections::BTreeSet;

    fn column(name: &str, table: &str, source: &str) -> LogicalColumn {
        LogicalColumn {
            name: name.to_string(),
            provenance: Provenance::direct(table, source),
            cql_type: CqlType::Text,
            is_static: false,
        }
    }

    fn table(index: usize, regular: &[&str], clustering: Option<SortOrder>) -> LogicalTable {
        let mut t = LogicalTable {
            name: String::new(),
            driving_table: "users".to_string(),
            origin: TableOrigin::Query,
            partition_key: vec![column("user_id", "users", "user_id")],
            clustering_key: clustering
                .map(|order| ClusteringColumn {
                    column: column("created_at", "users", "created_at"),
                    order,
                })
                .into_iter()
                .collect(),
            regular_columns: regular.iter().map(|c| column(c, "users", c)).collect(),
            collections: Vec::new(),
            serving: BTreeSet::from([index]),
            decisions: Vec::new(),
        };
        t.name = t.base_name();
        t
    }

    #[test]
    fn test_equal_keys_merge() {
        let merged = merge_tables(vec![
            table(2, &["email"], None),
            table(0, &["username", "email"], None),
        ]);

        assert_eq!(merged.len(), 1);
        let users = &merged[0];
        assert_eq!(users.name, "users_by_user_id");
        assert_eq!(users.serving, BTreeSet::from([0, 2]));
        let names: Vec<&str> = users.regular_columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["username", "email"]);
    }

    #[test]
    fn test_different_clustering_stays_apart_with_suffix() {
        let merged = merge_tables(vec![
            table(1, &["email"], Some(SortOrder::Desc)),
            table(0, &["email"], None),
            table(2, &["email"], Some(SortOrder::Asc)),
        ]);

        let names: Vec<&str> = merged.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users_by_user_id", "users_by_user_id_2", "users_by_user_id_3"]);
        assert_eq!(merged[1].clustering_key[0].order, SortOrder::Desc);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = merge_tables(vec![
            table(0, &["username"], None),
            table(1, &["email"], Some(SortOrder::Desc)),
            table(2, &["email"], None),
        ]);
        let twice = merge_tables(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_name_clash_with_other_provenance() {
        let mut other = table(1, &[], None);
        other.regular_columns.push(column("email", "contacts", "email"));

        let merged = merge_tables(vec![table(0, &["email"], None), other]);
        let names: Vec<&str> = merged[0].regular_columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["email", "email_2"]);
    }
}
