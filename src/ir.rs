//! Logical wide-column model produced by the planner and consumed by the
//! merger, the emitter and the report.

use crate::sql::{CqlType, SortOrder};
use crate::warning::Warning;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Where a logical column's value comes from: a relational column, reached
/// from the driving table through `path` (one entry per join hop).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Provenance {
    pub table: String,
    pub column: String,
    pub path: Vec<String>,
}

impl Provenance {
    pub fn direct(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            path: Vec::new(),
        }
    }

    pub fn describe(&self) -> String {
        if self.path.is_empty() {
            format!("{}.{}", self.table, self.column)
        } else {
            format!("{}.{} via {}", self.table, self.column, self.path.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalColumn {
    pub name: String,
    pub provenance: Provenance,
    pub cql_type: CqlType,
    /// One value per partition, shared by every clustered row.
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusteringColumn {
    pub column: LogicalColumn,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionKind {
    List,
    Set,
    Map,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Set => "set",
            Self::Map => "map",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionElement {
    pub provenance: Provenance,
    pub cql_type: CqlType,
}

/// A collection column. Map collections have exactly two elements: key, then value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionColumn {
    pub name: String,
    pub kind: CollectionKind,
    pub elements: Vec<CollectionElement>,
}

impl CollectionColumn {
    /// CQL type of the column.
    pub fn cql_type(&self) -> String {
        let element_types: Vec<&str> = self.elements.iter().map(|e| e.cql_type.as_str()).collect();
        match self.kind {
            CollectionKind::Map => format!(
                "map<{}, {}>",
                element_types.first().copied().unwrap_or("text"),
                element_types.get(1).copied().unwrap_or("text")
            ),
            CollectionKind::List | CollectionKind::Set => {
                let element = match element_types.as_slice() {
                    [single] => single.to_string(),
                    many => format!("frozen<tuple<{}>>", many.join(", ")),
                };
                format!("frozen<{}<{}>>", self.kind.as_str(), element)
            }
        }
    }
}

/// How a join was folded into the planned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinShape {
    OneToOneInline,
    AttributeMap,
    WidePartition,
    FrozenCollection,
}

impl JoinShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOneInline => "inline",
            Self::AttributeMap => "attribute map",
            Self::WidePartition => "wide partition",
            Self::FrozenCollection => "frozen collection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinDecision {
    pub pattern: usize,
    pub join: String,
    pub table: String,
    pub shape: JoinShape,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum TableOrigin {
    Query,
    /// Naive per-entity table for a relational table no query drives.
    Fallback { declaration_index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalTable {
    pub name: String,
    pub driving_table: String,
    pub origin: TableOrigin,
    pub partition_key: Vec<LogicalColumn>,
    pub clustering_key: Vec<ClusteringColumn>,
    pub regular_columns: Vec<LogicalColumn>,
    pub collections: Vec<CollectionColumn>,
    pub serving: BTreeSet<usize>,
    pub decisions: Vec<JoinDecision>,
}

/// Longest table name Cassandra accepts.
pub const MAX_TABLE_NAME: usize = 48;

/// `name` as is when it fits, otherwise cut short and ended with a hash of
/// the full name so distinct long names stay distinct.
pub fn fit_table_name(name: &str) -> String {
    if name.chars().count() <= MAX_TABLE_NAME {
        return name.to_string();
    }
    // FNV-1a: stable across runs and toolchains
    let hash = name
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
    let head: String = name.chars().take(MAX_TABLE_NAME - 9).collect();
    format!("{}_{:08x}", head.trim_end_matches('_'), hash)
}

/// Key structure that decides whether two tables can be merged.
pub type KeySignature = (Vec<(String, Provenance)>, Vec<(String, Provenance, SortOrder)>);

impl LogicalTable {
    /// Name before collision suffixes are applied.
    pub fn base_name(&self) -> String {
        let name = match self.origin {
            TableOrigin::Fallback { .. } => self.driving_table.clone(),
            TableOrigin::Query => {
                let keys: Vec<&str> = self.partition_key.iter().map(|c| c.name.as_str()).collect();
                format!("{}_by_{}", self.driving_table, keys.join("_"))
            }
        };
        fit_table_name(&name)
    }

    pub fn first_pattern(&self) -> Option<usize> {
        self.serving.iter().next().copied()
    }

    /// Emission order: query tables by earliest served pattern, then
    /// fallback tables in declaration order.
    pub fn emission_key(&self) -> (u8, usize) {
        match self.origin {
            TableOrigin::Query => (0, self.first_pattern().unwrap_or(usize::MAX)),
            TableOrigin::Fallback { declaration_index } => (1, declaration_index),
        }
    }

    pub fn key_signature(&self) -> KeySignature {
        (
            self.partition_key
                .iter()
                .map(|c| (c.name.clone(), c.provenance.clone()))
                .collect(),
            self.clustering_key
                .iter()
                .map(|c| (c.column.name.clone(), c.column.provenance.clone(), c.order))
                .collect(),
        )
    }

    /// Every column name in declaration order: keys, regular columns, collections.
    pub fn column_names(&self) -> Vec<&str> {
        self.partition_key
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.clustering_key.iter().map(|c| c.column.name.as_str()))
            .chain(self.regular_columns.iter().map(|c| c.name.as_str()))
            .chain(self.collections.iter().map(|c| c.name.as_str()))
            .collect()
    }

    /// Relational tables contributing columns, in first-use order.
    pub fn source_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        let provenances = self
            .partition_key
            .iter()
            .map(|c| &c.provenance)
            .chain(self.clustering_key.iter().map(|c| &c.column.provenance))
            .chain(self.regular_columns.iter().map(|c| &c.provenance))
            .chain(
                self.collections
                    .iter()
                    .flat_map(|c| c.elements.iter().map(|e| &e.provenance)),
            );
        for p in provenances {
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(&p.table)) {
                tables.push(&p.table);
            }
        }
        tables
    }
}

/// Output of one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    /// Tables in emission order.
    pub tables: Vec<LogicalTable>,
    /// Query pattern index to the name of the table serving it.
    pub serving: BTreeMap<usize, String>,
    pub warnings: Vec<Warning>,
}

impl ConversionResult {
    pub fn table(&self, name: &str) -> Option<&LogicalTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn serving_table(&self, pattern: usize) -> Option<&LogicalTable> {
        self.serving.get(&pattern).and_then(|name| self.table(name))
    }
}
