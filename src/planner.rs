//! Denormalization planner.
//!
//! Each query pattern is planned on its own into one logical table: the
//! driving table's equality filters become the partition key, ordering and
//! range columns become clustering columns, and every join hop is folded in
//! according to its [`JoinShape`]. Patterns share nothing, so planning runs
//! on scoped worker threads and results are collected in pattern order.

pub(crate) mod fallback;
pub(crate) mod naming;
pub mod shape;

use crate::config::AttributeMapConfig;
use crate::ir::{
    ClusteringColumn, CollectionColumn, CollectionElement, CollectionKind, JoinDecision,
    JoinShape, LogicalColumn, LogicalTable, Provenance, TableOrigin,
};
use crate::pattern::{BoundColumn, Cardinality, JoinEdge, QueryPattern};
use crate::schema::{Column, RelationalSchema, Table};
use crate::sql::{JoinKind, SortOrder, TypeTable};
use crate::warning::Warning;
use naming::ColumnNamer;
pub use shape::{AttributePairRule, NamingConventionRule};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A planned pattern: its table before merging, and the warnings planning raised.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPattern {
    pub index: usize,
    pub table: LogicalTable,
    pub warnings: Vec<Warning>,
}

pub struct Planner<'a> {
    schema: &'a RelationalSchema,
    types: &'a TypeTable,
    rule: Box<dyn AttributePairRule>,
}

impl<'a> Planner<'a> {
    pub fn new(schema: &'a RelationalSchema, types: &'a TypeTable, config: &AttributeMapConfig) -> Self {
        Self {
            schema,
            types,
            rule: Box::new(NamingConventionRule::from_config(config)),
        }
    }

    /// Replace the attribute-map rule.
    pub fn with_rule(mut self, rule: Box<dyn AttributePairRule>) -> Self {
        self.rule = rule;
        self
    }

    /// Plan every pattern on up to `workers` threads. The result is in
    /// pattern order whatever the worker count.
    pub fn plan_all(&self, patterns: &[QueryPattern], workers: usize) -> Vec<PlannedPattern> {
        if workers <= 1 || patterns.len() <= 1 {
            return patterns.iter().map(|p| self.plan(p)).collect();
        }

        let chunk_size = patterns.len().div_ceil(workers);
        log::debug!(
            "planning {} patterns on {} workers",
            patterns.len(),
            patterns.len().div_ceil(chunk_size)
        );

        std::thread::scope(|scope| {
            let handles: Vec<_> = patterns
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || chunk.iter().map(|p| self.plan(p)).collect::<Vec<_>>())
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    /// Fallback tables for every relational table none of `planned` drives.
    pub fn fallback(&self, planned: &[PlannedPattern]) -> Vec<LogicalTable> {
        let driven: BTreeSet<String> = planned
            .iter()
            .map(|p| p.table.driving_table.to_ascii_lowercase())
            .collect();
        fallback::fallback_tables(self.schema, self.types, &driven)
    }

    pub fn plan(&self, pattern: &QueryPattern) -> PlannedPattern {
        let mut builder = TableBuilder::new(self, pattern);
        builder.partition_key();
        builder.clustering_key();
        builder.driving_columns();
        for edge in &pattern.joins {
            builder.fold_join(edge);
        }
        builder.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Placement {
    /// Columns land on the table row.
    Row,
    /// Columns land in the element tuple of a collection.
    Collection(usize),
    /// Nothing from this alias is materialized.
    Omitted,
}

struct TableBuilder<'p, 'a> {
    planner: &'p Planner<'a>,
    pattern: &'p QueryPattern,
    namer: ColumnNamer,
    partition: Vec<LogicalColumn>,
    clustering: Vec<ClusteringColumn>,
    /// Regular columns with the alias they were read from.
    regular: Vec<(String, LogicalColumn)>,
    collections: Vec<CollectionColumn>,
    decisions: Vec<JoinDecision>,
    warnings: Vec<Warning>,
    paths: HashMap<String, Vec<String>>,
    parents: HashMap<String, String>,
    placement: HashMap<String, Placement>,
    wide_aliases: HashSet<String>,
}

fn alias_key(alias: &str) -> String {
    alias.to_ascii_lowercase()
}

fn hop_label(edge: &JoinEdge) -> String {
    format!(
        "{}.{} -> {}.{}",
        edge.from.table, edge.from.column, edge.to.table, edge.to.column
    )
}

impl<'p, 'a> TableBuilder<'p, 'a> {
    fn new(planner: &'p Planner<'a>, pattern: &'p QueryPattern) -> Self {
        let mut paths = HashMap::new();
        let mut parents = HashMap::new();
        paths.insert(alias_key(&pattern.driving.alias), Vec::new());
        for edge in &pattern.joins {
            let mut path = paths
                .get(&alias_key(&edge.from.alias))
                .cloned()
                .unwrap_or_default();
            path.push(hop_label(edge));
            paths.insert(alias_key(&edge.to.alias), path);
            parents.insert(alias_key(&edge.to.alias), alias_key(&edge.from.alias));
        }

        let mut placement = HashMap::new();
        placement.insert(alias_key(&pattern.driving.alias), Placement::Row);

        Self {
            planner,
            pattern,
            namer: ColumnNamer::new(),
            partition: Vec::new(),
            clustering: Vec::new(),
            regular: Vec::new(),
            collections: Vec::new(),
            decisions: Vec::new(),
            warnings: Vec::new(),
            paths,
            parents,
            placement,
            wide_aliases: HashSet::new(),
        }
    }

    fn reached(&self, alias: &str) -> bool {
        self.paths.contains_key(&alias_key(alias))
    }

    fn provenance(&self, alias: &str, table: &str, column: &str) -> Provenance {
        Provenance {
            table: table.to_string(),
            column: column.to_string(),
            path: self.paths.get(&alias_key(alias)).cloned().unwrap_or_default(),
        }
    }

    fn bound_provenance(&self, column: &BoundColumn) -> Provenance {
        self.provenance(&column.alias, &column.table, &column.column)
    }

    fn logical(&self, name: String, provenance: Provenance) -> LogicalColumn {
        let cql_type = self.planner.types.get(&provenance.table, &provenance.column);
        LogicalColumn {
            name,
            provenance,
            cql_type,
            is_static: false,
        }
    }

    fn is_key(&self, provenance: &Provenance) -> bool {
        self.partition.iter().any(|c| &c.provenance == provenance)
            || self.clustering.iter().any(|c| &c.column.provenance == provenance)
    }

    fn is_materialized(&self, provenance: &Provenance) -> bool {
        self.is_key(provenance)
            || self.regular.iter().any(|(_, c)| &c.provenance == provenance)
            || self
                .collections
                .iter()
                .any(|c| c.elements.iter().any(|e| &e.provenance == provenance))
    }

    fn partition_key(&mut self) {
        let filters: Vec<BoundColumn> = self.pattern.driving_filters().cloned().collect();
        for filter in &filters {
            let provenance = self.bound_provenance(filter);
            if self.is_key(&provenance) {
                continue;
            }
            let name = self.namer.preferring_bare(&filter.alias, &filter.column);
            let column = self.logical(name, provenance);
            self.partition.push(column);
        }

        if !self.partition.is_empty() {
            return;
        }

        let driving = &self.pattern.driving;
        log::warn!(
            "Q{}: no equality filter on {}, keyed by its primary key",
            self.pattern.index,
            driving.table
        );
        self.warnings.push(Warning::NoPartitionKey {
            index: self.pattern.index,
            table: driving.table.clone(),
        });

        let Some(table) = self.planner.schema.table(&driving.table) else {
            return;
        };
        let mut keys: Vec<&Column> = table.primary_key();
        if keys.is_empty() {
            keys = table.columns.iter().take(1).collect();
        }
        for key in keys {
            let name = self.namer.preferring_bare(&driving.alias, &key.name);
            let column = self.logical(name, Provenance::direct(&table.name, &key.name));
            self.partition.push(column);
        }
    }

    fn push_clustering(&mut self, column: &BoundColumn, order: SortOrder) {
        if !self.reached(&column.alias) {
            log::debug!(
                "Q{}: {} is not connected to the driving table",
                self.pattern.index,
                column.qualified()
            );
            return;
        }
        let provenance = self.bound_provenance(column);
        if self.is_key(&provenance) {
            return;
        }
        let name = self.namer.preferring_bare(&column.alias, &column.column);
        let column = self.logical(name, provenance);
        self.clustering.push(ClusteringColumn { column, order });
    }

    /// Equalities on joined tables lead, then ORDER BY, then ranges.
    fn clustering_key(&mut self) {
        let pattern = self.pattern;
        for filter in pattern.joined_filters() {
            self.push_clustering(filter, SortOrder::Asc);
        }
        for item in &pattern.order_by {
            self.push_clustering(&item.column, item.order);
        }
        for range in &pattern.ranges {
            self.push_clustering(range, SortOrder::Asc);
        }
    }

    fn driving_columns(&mut self) {
        let driving = &self.pattern.driving;
        let Some(table) = self.planner.schema.table(&driving.table) else {
            return;
        };
        for column in self.pattern.projected(&driving.alias, table) {
            let provenance = Provenance::direct(&table.name, &column.name);
            if self.is_materialized(&provenance) {
                continue;
            }
            let name = self.namer.preferring_bare(&driving.alias, &column.name);
            let logical = self.logical(name, provenance);
            self.regular.push((alias_key(&driving.alias), logical));
        }
    }

    /// True when ORDER BY names `alias` or an alias joined beneath it.
    fn ordered_under(&self, alias: &str) -> bool {
        let target = alias_key(alias);
        self.pattern.order_by.iter().any(|item| {
            let mut current = alias_key(&item.column.alias);
            loop {
                if current == target {
                    return true;
                }
                match self.parents.get(&current) {
                    Some(parent) => current = parent.clone(),
                    None => return false,
                }
            }
        })
    }

    /// Projected columns of the joined side, without the join column when
    /// the value it repeats is already stored.
    fn joined_columns(&self, edge: &JoinEdge, child: &'p Table) -> Vec<&'p Column> {
        let repeats_parent = self.is_materialized(&self.bound_provenance(&edge.from));
        self.pattern
            .projected(&edge.to.alias, child)
            .into_iter()
            .filter(|c| !(repeats_parent && c.name.eq_ignore_ascii_case(&edge.to.column)))
            .collect()
    }

    fn decide(&mut self, edge: &JoinEdge, shape: JoinShape, reason: String) {
        let reason = match edge.kind {
            JoinKind::Left => format!(
                "{}; LEFT JOIN, so {} values are null when no row matches",
                reason, edge.to.alias
            ),
            JoinKind::Inner => reason,
        };
        log::debug!(
            "Q{}: {} folded as {}",
            self.pattern.index,
            edge.describe(),
            shape.as_str()
        );
        self.decisions.push(JoinDecision {
            pattern: self.pattern.index,
            join: edge.describe(),
            table: edge.to.table.clone(),
            shape,
            reason,
        });
    }

    fn fold_join(&mut self, edge: &JoinEdge) {
        let Some(child) = self.planner.schema.table(&edge.to.table) else {
            return;
        };
        let to = alias_key(&edge.to.alias);
        let parent_placement = self
            .placement
            .get(&alias_key(&edge.from.alias))
            .copied()
            .unwrap_or(Placement::Omitted);

        let placement = match parent_placement {
            Placement::Row => match edge.cardinality {
                Cardinality::OneToOne => self.inline(edge, child),
                Cardinality::OneToMany if self.ordered_under(&edge.to.alias) => {
                    self.wide_partition(edge, child)
                }
                Cardinality::OneToMany => match self.planner.rule.attribute_pair(child, &edge.to.column) {
                    Some((name, value)) => self.attribute_map(edge, child, name, value),
                    None => self.frozen_collection(edge, child),
                },
            },
            Placement::Collection(idx) => self.nested(edge, child, idx),
            Placement::Omitted => {
                self.decide(
                    edge,
                    JoinShape::FrozenCollection,
                    "nested under a join that is not materialized as a row or collection".to_string(),
                );
                Placement::Omitted
            }
        };
        self.placement.insert(to, placement);
    }

    fn push_regular(&mut self, edge: &JoinEdge, columns: &[&Column]) {
        for column in columns {
            let provenance = self.provenance(&edge.to.alias, &edge.to.table, &column.name);
            if self.is_materialized(&provenance) {
                continue;
            }
            let name = self.namer.prefixed(&edge.to.alias, &column.name);
            let logical = self.logical(name, provenance);
            self.regular.push((alias_key(&edge.to.alias), logical));
        }
    }

    fn inline(&mut self, edge: &JoinEdge, child: &'p Table) -> Placement {
        let columns = self.joined_columns(edge, child);
        self.push_regular(edge, &columns);
        let reason = format!(
            "at most one {} row per {} row; columns inlined with prefix '{}_'",
            edge.to.table, edge.from.table, edge.to.alias
        );
        self.decide(edge, JoinShape::OneToOneInline, reason);
        self.note_recursion(edge);
        Placement::Row
    }

    fn wide_partition(&mut self, edge: &JoinEdge, child: &'p Table) -> Placement {
        let mut keys = Vec::new();
        for pk in child.primary_key() {
            let provenance = self.provenance(&edge.to.alias, &child.name, &pk.name);
            if self.is_key(&provenance) {
                continue;
            }
            let name = self.namer.preferring_bare(&edge.to.alias, &pk.name);
            keys.push(name.clone());
            let column = self.logical(name, provenance);
            self.clustering.push(ClusteringColumn {
                column,
                order: SortOrder::Asc,
            });
        }

        let columns = self.joined_columns(edge, child);
        self.push_regular(edge, &columns);
        self.wide_aliases.insert(alias_key(&edge.to.alias));

        let reason = if keys.is_empty() {
            format!("ORDER BY reaches {}; one clustered row per child row", edge.to.table)
        } else {
            format!(
                "ORDER BY reaches {}; one clustered row per child row, distinguished by {}",
                edge.to.table,
                keys.join(", ")
            )
        };
        self.decide(edge, JoinShape::WidePartition, reason);
        self.note_recursion(edge);
        Placement::Row
    }

    fn attribute_map(
        &mut self,
        edge: &JoinEdge,
        child: &Table,
        name: &Column,
        value: &Column,
    ) -> Placement {
        let elements = [name, value]
            .iter()
            .map(|c| {
                let provenance = self.provenance(&edge.to.alias, &child.name, &c.name);
                CollectionElement {
                    cql_type: self.planner.types.get(&child.name, &c.name),
                    provenance,
                }
            })
            .collect();
        let column_name = self.namer.prefixed(&edge.to.alias, &child.name);
        self.collections.push(CollectionColumn {
            name: column_name,
            kind: CollectionKind::Map,
            elements,
        });

        let reason = format!(
            "child rows are name/value pairs; map keyed by {} holding {}",
            name.name, value.name
        );
        self.decide(edge, JoinShape::AttributeMap, reason);
        self.note_recursion(edge);
        Placement::Omitted
    }

    fn frozen_collection(&mut self, edge: &JoinEdge, child: &'p Table) -> Placement {
        let columns = self.joined_columns(edge, child);
        if columns.is_empty() {
            self.decide(
                edge,
                JoinShape::FrozenCollection,
                "one-to-many join with no projected columns; nothing folded".to_string(),
            );
            self.note_recursion(edge);
            return Placement::Omitted;
        }

        let elements: Vec<CollectionElement> = columns
            .iter()
            .map(|c| CollectionElement {
                provenance: self.provenance(&edge.to.alias, &child.name, &c.name),
                cql_type: self.planner.types.get(&child.name, &c.name),
            })
            .collect();
        let has_identity = child.primary_key().iter().all(|pk| {
            elements
                .iter()
                .any(|e| e.provenance.column.eq_ignore_ascii_case(&pk.name))
        }) && !child.primary_key().is_empty();
        let kind = if has_identity {
            CollectionKind::Set
        } else {
            CollectionKind::List
        };

        let column_name = self.namer.prefixed(&edge.to.alias, &child.name);
        self.collections.push(CollectionColumn {
            name: column_name,
            kind,
            elements,
        });

        let reason = format!(
            "one-to-many without ordering on {}; child rows folded into a frozen {}",
            edge.to.table,
            kind.as_str()
        );
        self.decide(edge, JoinShape::FrozenCollection, reason);
        self.note_recursion(edge);
        Placement::Collection(self.collections.len() - 1)
    }

    fn nested(&mut self, edge: &JoinEdge, child: &'p Table, idx: usize) -> Placement {
        let columns = self.joined_columns(edge, child);
        for column in columns {
            let provenance = self.provenance(&edge.to.alias, &child.name, &column.name);
            if self.is_materialized(&provenance) {
                continue;
            }
            let cql_type = self.planner.types.get(&child.name, &column.name);
            if let Some(collection) = self.collections.get_mut(idx) {
                collection.elements.push(CollectionElement {
                    provenance,
                    cql_type,
                });
            }
        }

        let collection = self
            .collections
            .get(idx)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let reason = format!("joined beneath {}; columns added to its elements", collection);
        self.decide(edge, JoinShape::FrozenCollection, reason);
        self.note_recursion(edge);
        Placement::Collection(idx)
    }

    /// Record the depth of a self reference the first time it is folded.
    fn note_recursion(&mut self, edge: &JoinEdge) {
        if !edge.self_reference {
            return;
        }
        let Some(table) = self.planner.schema.table(&edge.to.table) else {
            return;
        };
        let column = if table
            .foreign_key_to(&edge.to.column, &edge.from.table, &edge.from.column)
            .is_some()
        {
            edge.to.column.clone()
        } else {
            edge.from.column.clone()
        };

        let already = self.warnings.iter().any(|w| {
            matches!(w, Warning::UnmaterializedRecursion { table: t, column: c, .. }
                if t.eq_ignore_ascii_case(&table.name) && c.eq_ignore_ascii_case(&column))
        });
        if already {
            return;
        }

        let depth = self
            .pattern
            .joins
            .iter()
            .filter(|e| {
                e.self_reference
                    && e.to.table.eq_ignore_ascii_case(&table.name)
                    && (e.to.column.eq_ignore_ascii_case(&column)
                        || e.from.column.eq_ignore_ascii_case(&column))
            })
            .count();
        log::warn!(
            "Q{}: self reference {}.{} materialized to depth {}",
            self.pattern.index,
            table.name,
            column,
            depth
        );
        self.warnings.push(Warning::UnmaterializedRecursion {
            index: self.pattern.index,
            table: table.name.clone(),
            column,
            depth,
        });
    }

    /// Parent-row columns of a wide partition hold one value per partition.
    fn mark_static(&mut self) {
        if self.wide_aliases.is_empty() || self.clustering.is_empty() {
            return;
        }
        let driving = &self.pattern.driving;
        let keyed_by_parent = self.planner.schema.table(&driving.table).is_some_and(|table| {
            let pk = table.primary_key();
            !pk.is_empty()
                && pk.iter().all(|k| {
                    self.partition
                        .iter()
                        .any(|p| p.provenance == Provenance::direct(&table.name, &k.name))
                })
        });
        if !keyed_by_parent {
            return;
        }

        let under_wide: HashSet<String> = self
            .regular
            .iter()
            .map(|(alias, _)| alias.clone())
            .filter(|alias| {
                let mut current = alias.clone();
                loop {
                    if self.wide_aliases.contains(&current) {
                        return true;
                    }
                    match self.parents.get(&current) {
                        Some(parent) => current = parent.clone(),
                        None => return false,
                    }
                }
            })
            .collect();

        for (alias, column) in &mut self.regular {
            column.is_static = !under_wide.contains(alias);
        }
    }

    fn finish(mut self) -> PlannedPattern {
        self.mark_static();

        let pattern = self.pattern;
        let mut warnings = self.warnings;
        for condition in &pattern.detached {
            log::warn!("Q{}: detached join condition {}", pattern.index, condition);
            warnings.push(Warning::DetachedJoin {
                index: pattern.index,
                condition: condition.clone(),
            });
        }
        if pattern.has_offset {
            log::warn!("Q{}: OFFSET dropped, LIMIT kept", pattern.index);
            warnings.push(Warning::OffsetUnsupported {
                index: pattern.index,
            });
        }

        let mut table = LogicalTable {
            name: String::new(),
            driving_table: pattern.driving.table.clone(),
            origin: TableOrigin::Query,
            partition_key: self.partition,
            clustering_key: self.clustering,
            regular_columns: self.regular.into_iter().map(|(_, c)| c).collect(),
            collections: self.collections,
            serving: BTreeSet::from([pattern.index]),
            decisions: self.decisions,
        };
        table.name = table.base_name();

        PlannedPattern {
            index: pattern.index,
            table,
            warnings,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pattern::{ParseOutcome, parse_pattern};
    use crate::schema::tests::schema_from_json;

    pub(crate) const SHOP: &str = r#"{"tables": [
        {"name": "users", "columns": [
            {"name": "user_id", "type": "uuid", "primary_key": true},
            {"name": "username", "type": "varchar(50)"},
            {"name": "email", "type": "varchar(255)"}
        ]},
        {"name": "user_addresses", "columns": [
            {"name": "address_id", "type": "uuid", "primary_key": true},
            {"name": "user_id", "type": "uuid"},
            {"name": "street_address", "type": "text"},
            {"name": "city", "type": "text"}
        ], "foreign_keys": [
            {"column": "user_id", "references": {"table": "users", "column": "user_id"}}
        ]},
        {"name": "orders", "columns": [
            {"name": "order_id", "type": "uuid", "primary_key": true},
            {"name": "user_id", "type": "uuid"},
            {"name": "created_at", "type": "timestamp"},
            {"name": "total", "type": "decimal(10,2)"},
            {"name": "shipping_address_id", "type": "uuid"},
            {"name": "billing_address_id", "type": "uuid"}
        ], "foreign_keys": [
            {"column": "user_id", "references": {"table": "users", "column": "user_id"}},
            {"column": "shipping_address_id", "references": {"table": "user_addresses", "column": "address_id"}},
            {"column": "billing_address_id", "references": {"table": "user_addresses", "column": "address_id"}}
        ]},
        {"name": "user_preferences", "columns": [
            {"name": "preference_id", "type": "uuid", "primary_key": true},
            {"name": "user_id", "type": "uuid"},
            {"name": "preference_key", "type": "text"},
            {"name": "preference_value", "type": "text"}
        ], "foreign_keys": [
            {"column": "user_id", "references": {"table": "users", "column": "user_id"}}
        ]},
        {"name": "categories", "columns": [
            {"name": "category_id", "type": "int", "primary_key": true},
            {"name": "parent_category_id", "type": "int"},
            {"name": "name", "type": "text"}
        ], "foreign_keys": [
            {"column": "parent_category_id", "references": {"table": "categories", "column": "category_id"}}
        ]}
    ]}"#;

    fn plan(query: &str) -> PlannedPattern {
        let schema = schema_from_json(SHOP);
        let types = TypeTable::build(&schema, &mut Vec::new());
        let planner = Planner::new(&schema, &types, &AttributeMapConfig::default());
        let ParseOutcome::Parsed(pattern) = parse_pattern(0, query, &schema) else {
            panic!("query did not parse: {query}");
        };
        planner.plan(&pattern)
    }

    fn names(columns: &[LogicalColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_point_lookup_folds_children_into_set() {
        let planned = plan(
            "SELECT u.*, a.* FROM users u JOIN user_addresses a ON u.user_id=a.user_id WHERE u.user_id=?",
        );
        let table = &planned.table;

        assert_eq!(table.name, "users_by_user_id");
        assert_eq!(names(&table.partition_key), vec!["user_id"]);
        assert!(table.clustering_key.is_empty());
        assert_eq!(names(&table.regular_columns), vec!["username", "email"]);

        assert_eq!(table.collections.len(), 1);
        let addresses = &table.collections[0];
        assert_eq!(addresses.name, "a_user_addresses");
        assert_eq!(addresses.kind, CollectionKind::Set);
        let cols: Vec<&str> = addresses.elements.iter().map(|e| e.provenance.column.as_str()).collect();
        assert_eq!(cols, vec!["address_id", "street_address", "city"]);
        assert_eq!(table.decisions[0].shape, JoinShape::FrozenCollection);
        assert!(planned.warnings.is_empty());
    }

    #[test]
    fn test_order_on_child_makes_wide_partition() {
        let planned = plan(
            "SELECT u.username, o.* FROM users u JOIN orders o ON o.user_id = u.user_id \
             WHERE u.user_id = ? ORDER BY o.created_at DESC",
        );
        let table = &planned.table;

        assert_eq!(names(&table.partition_key), vec!["user_id"]);
        let clustering: Vec<(&str, SortOrder)> = table
            .clustering_key
            .iter()
            .map(|c| (c.column.name.as_str(), c.order))
            .collect();
        assert_eq!(
            clustering,
            vec![("created_at", SortOrder::Desc), ("order_id", SortOrder::Asc)]
        );
        assert_eq!(table.decisions[0].shape, JoinShape::WidePartition);

        let username = &table.regular_columns[0];
        assert_eq!(username.name, "username");
        assert!(username.is_static);
        let total = table.regular_columns.iter().find(|c| c.name == "o_total").unwrap();
        assert!(!total.is_static);
    }

    #[test]
    fn test_name_value_child_becomes_map() {
        let planned = plan(
            "SELECT u.*, p.* FROM users u LEFT JOIN user_preferences p ON u.user_id = p.user_id WHERE u.user_id = ?",
        );
        let map = &planned.table.collections[0];

        assert_eq!(map.kind, CollectionKind::Map);
        assert_eq!(map.cql_type(), "map<text, text>");
        assert_eq!(map.elements[0].provenance.column, "preference_key");
        assert_eq!(planned.table.decisions[0].shape, JoinShape::AttributeMap);
    }

    #[test]
    fn test_ordering_wins_over_attribute_shape() {
        let planned = plan(
            "SELECT u.*, p.* FROM users u JOIN user_preferences p ON u.user_id = p.user_id \
             WHERE u.user_id = ? ORDER BY p.preference_key",
        );
        assert_eq!(planned.table.decisions[0].shape, JoinShape::WidePartition);
        assert!(planned.table.collections.is_empty());
    }

    #[test]
    fn test_parallel_foreign_keys_stay_apart() {
        let planned = plan(
            "SELECT o.*, s.city, b.city FROM orders o \
             JOIN user_addresses s ON o.shipping_address_id = s.address_id \
             JOIN user_addresses b ON o.billing_address_id = b.address_id WHERE o.order_id = ?",
        );
        let table = &planned.table;

        assert!(table.regular_columns.iter().any(|c| c.name == "s_city"));
        assert!(table.regular_columns.iter().any(|c| c.name == "b_city"));
        let shipping = table.regular_columns.iter().find(|c| c.name == "s_city").unwrap();
        let billing = table.regular_columns.iter().find(|c| c.name == "b_city").unwrap();
        assert_ne!(shipping.provenance, billing.provenance);
        assert!(table.decisions.iter().all(|d| d.shape == JoinShape::OneToOneInline));
    }

    #[test]
    fn test_self_reference_depth_and_missing_partition_key() {
        let planned = plan(
            "SELECT c1.*, c2.* FROM categories c1 LEFT JOIN categories c2 \
             ON c1.category_id=c2.parent_category_id WHERE c1.parent_category_id IS NULL",
        );
        let table = &planned.table;

        assert_eq!(names(&table.partition_key), vec!["category_id"]);
        assert_eq!(table.collections.len(), 1);
        assert_eq!(table.collections[0].name, "c2_categories");
        assert_eq!(
            planned.warnings,
            vec![
                Warning::NoPartitionKey {
                    index: 0,
                    table: "categories".to_string()
                },
                Warning::UnmaterializedRecursion {
                    index: 0,
                    table: "categories".to_string(),
                    column: "parent_category_id".to_string(),
                    depth: 1
                },
            ]
        );
    }

    #[test]
    fn test_self_reference_depth_follows_join_hops() {
        let planned = plan(
            "SELECT c1.*, c2.*, c3.* FROM categories c1 \
             JOIN categories c2 ON c1.category_id = c2.parent_category_id \
             JOIN categories c3 ON c2.category_id = c3.parent_category_id WHERE c1.category_id = ?",
        );
        let table = &planned.table;

        assert_eq!(table.collections.len(), 1);
        let children = &table.collections[0];
        assert_eq!(children.name, "c2_categories");
        assert_eq!(children.cql_type(), "frozen<set<frozen<tuple<int, text, int, text>>>>");
        assert_eq!(children.elements[2].provenance.path.len(), 2);
        assert_eq!(table.decisions[1].shape, JoinShape::FrozenCollection);
        assert!(table.decisions[1].reason.contains("c2_categories"));
        assert_eq!(
            planned.warnings,
            vec![Warning::UnmaterializedRecursion {
                index: 0,
                table: "categories".to_string(),
                column: "parent_category_id".to_string(),
                depth: 2
            }]
        );
    }

    #[test]
    fn test_join_beneath_collection_extends_its_elements() {
        let planned = plan(
            "SELECT u.username, o.order_id, o.total, s.city FROM users u \
             JOIN orders o ON o.user_id = u.user_id \
             JOIN user_addresses s ON o.shipping_address_id = s.address_id WHERE u.user_id = ?",
        );
        let table = &planned.table;

        assert_eq!(names(&table.regular_columns), vec!["username"]);
        assert_eq!(table.collections.len(), 1);
        let orders = &table.collections[0];
        assert_eq!(orders.name, "o_orders");
        assert_eq!(orders.kind, CollectionKind::Set);
        let cols: Vec<&str> = orders.elements.iter().map(|e| e.provenance.column.as_str()).collect();
        assert_eq!(cols, vec!["order_id", "total", "city"]);
        assert_eq!(
            orders.elements[2].provenance.path,
            vec![
                "users.user_id -> orders.user_id".to_string(),
                "orders.shipping_address_id -> user_addresses.address_id".to_string(),
            ]
        );
    }

    #[test]
    fn test_unjoined_alias_is_reported() {
        let planned = plan("SELECT u.*, c.name FROM users u, categories c WHERE u.user_id = ?");

        assert_eq!(names(&planned.table.regular_columns), vec!["username", "email"]);
        assert!(planned.table.decisions.is_empty());
        assert_eq!(
            planned.warnings,
            vec![Warning::DetachedJoin {
                index: 0,
                condition: "c (no join condition)".to_string()
            }]
        );
    }

    #[test]
    fn test_left_join_is_noted_in_the_decision() {
        let left = plan(
            "SELECT u.*, p.* FROM users u LEFT JOIN user_preferences p ON u.user_id = p.user_id WHERE u.user_id = ?",
        );
        let inner = plan(
            "SELECT u.*, p.* FROM users u JOIN user_preferences p ON u.user_id = p.user_id WHERE u.user_id = ?",
        );

        assert!(left.table.decisions[0].reason.contains("LEFT JOIN"));
        assert!(!inner.table.decisions[0].reason.contains("LEFT JOIN"));
    }

    struct AddressPairs;

    impl AttributePairRule for AddressPairs {
        fn attribute_pair<'t>(
            &self,
            child: &'t Table,
            _join_column: &str,
        ) -> Option<(&'t Column, &'t Column)> {
            Some((child.column("street_address")?, child.column("city")?))
        }
    }

    #[test]
    fn test_custom_attribute_rule_replaces_default() {
        let schema = schema_from_json(SHOP);
        let types = TypeTable::build(&schema, &mut Vec::new());
        let planner = Planner::new(&schema, &types, &AttributeMapConfig::default())
            .with_rule(Box::new(AddressPairs));
        let ParseOutcome::Parsed(pattern) = parse_pattern(
            0,
            "SELECT u.*, a.* FROM users u JOIN user_addresses a ON u.user_id=a.user_id WHERE u.user_id=?",
            &schema,
        ) else {
            panic!("query did not parse");
        };
        let planned = planner.plan(&pattern);
        let map = &planned.table.collections[0];

        assert_eq!(planned.table.decisions[0].shape, JoinShape::AttributeMap);
        assert_eq!(map.kind, CollectionKind::Map);
        assert_eq!(map.elements[0].provenance.column, "street_address");
        assert_eq!(map.elements[1].provenance.column, "city");

        // Children without the pair are folded as usual.
        let ParseOutcome::Parsed(prefs) = parse_pattern(
            1,
            "SELECT u.*, p.* FROM users u JOIN user_preferences p ON u.user_id = p.user_id WHERE u.user_id = ?",
            &schema,
        ) else {
            panic!("query did not parse");
        };
        let planned = planner.plan(&prefs);
        assert_eq!(planned.table.decisions[0].shape, JoinShape::FrozenCollection);
    }

    #[test]
    fn test_disabled_attribute_maps() {
        let schema = schema_from_json(SHOP);
        let types = TypeTable::build(&schema, &mut Vec::new());
        let config = AttributeMapConfig {
            enabled: false,
            ..Default::default()
        };
        let planner = Planner::new(&schema, &types, &config);
        let ParseOutcome::Parsed(pattern) = parse_pattern(
            0,
            "SELECT u.*, p.* FROM users u JOIN user_preferences p ON u.user_id = p.user_id WHERE u.user_id = ?",
            &schema,
        ) else {
            panic!("query did not parse");
        };
        let planned = planner.plan(&pattern);
        assert_eq!(planned.table.collections[0].kind, CollectionKind::Set);
    }

    #[test]
    fn test_ranges_trail_the_clustering_key() {
        let planned = plan(
            "SELECT * FROM orders WHERE user_id = ? AND created_at >= ? ORDER BY total DESC LIMIT 10 OFFSET 20",
        );
        let clustering: Vec<&str> = planned
            .table
            .clustering_key
            .iter()
            .map(|c| c.column.name.as_str())
            .collect();
        assert_eq!(clustering, vec!["total", "created_at"]);
        assert_eq!(planned.warnings, vec![Warning::OffsetUnsupported { index: 0 }]);
    }

    #[test]
    fn test_parallel_planning_matches_sequential() {
        let schema = schema_from_json(SHOP);
        let types = TypeTable::build(&schema, &mut Vec::new());
        let planner = Planner::new(&schema, &types, &AttributeMapConfig::default());
        let corpus = [
            "SELECT * FROM users WHERE user_id = ?",
            "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC",
            "SELECT c1.*, c2.* FROM categories c1 JOIN categories c2 ON c1.category_id = c2.parent_category_id WHERE c1.category_id = ?",
            "SELECT * FROM user_preferences WHERE user_id = ?",
            "SELECT * FROM user_addresses WHERE city = ?",
        ];
        let patterns: Vec<QueryPattern> = corpus
            .iter()
            .enumerate()
            .filter_map(|(i, q)| match parse_pattern(i, q, &schema) {
                ParseOutcome::Parsed(p) => Some(p),
                ParseOutcome::Skipped { .. } => None,
            })
            .collect();

        let sequential = planner.plan_all(&patterns, 1);
        let parallel = planner.plan_all(&patterns, 3);
        assert_eq!(sequential, parallel);
        let indices: Vec<usize> = parallel.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}
