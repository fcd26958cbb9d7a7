//! Best-practice findings about the relational schema itself.
//!
//! Nothing here changes the generated tables; the findings are listed in
//! the report next to the dependency levels of the relational tables.

use crate::schema::RelationalSchema;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Finding {
    MissingPrimaryKey {
        table: String,
    },
    WeakPrimaryKey {
        table: String,
        column: String,
    },
    PrecisionSensitive {
        table: String,
        column: String,
        data_type: String,
    },
    JunctionTable {
        table: String,
        connects: Vec<String>,
    },
    Hierarchy {
        table: String,
        column: String,
    },
    HighConnectivity {
        table: String,
        incoming: usize,
        outgoing: usize,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrimaryKey { table } => {
                write!(f, "{}: no primary key; the first column is used as partition key", table)
            }
            Self::WeakPrimaryKey { table, column } => write!(
                f,
                "{}: single-column key '{}' may create hot partitions unless it is high-cardinality",
                table, column
            ),
            Self::PrecisionSensitive {
                table,
                column,
                data_type,
            } => write!(
                f,
                "{}.{}: '{}' is precision sensitive; consider scaled integers",
                table, column, data_type
            ),
            Self::JunctionTable { table, connects } => write!(
                f,
                "{}: junction table between {}; many-to-many reads need one table per direction",
                table,
                connects.join(" and ")
            ),
            Self::Hierarchy { table, column } => write!(
                f,
                "{}.{}: self reference; only the depth a query traverses is materialized",
                table, column
            ),
            Self::HighConnectivity {
                table,
                incoming,
                outgoing,
            } => write!(
                f,
                "{}: highly connected ({} incoming, {} outgoing foreign keys)",
                table, incoming, outgoing
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaAnalysis {
    /// Tables grouped by foreign-key depth; parents come before children.
    pub levels: Vec<Vec<String>>,
    pub findings: Vec<Finding>,
}

const PRECISION_SENSITIVE: &[&str] = &["float", "real", "double", "decimal", "numeric"];

pub fn analyze(schema: &RelationalSchema) -> SchemaAnalysis {
    let mut findings = Vec::new();

    for table in schema.tables() {
        let pk = table.primary_key();
        match pk.as_slice() {
            [] => findings.push(Finding::MissingPrimaryKey {
                table: table.name.clone(),
            }),
            [single] => {
                let lower_type = single.data_type.to_ascii_lowercase();
                if !lower_type.contains("uuid") && !single.name.to_ascii_lowercase().contains("id") {
                    findings.push(Finding::WeakPrimaryKey {
                        table: table.name.clone(),
                        column: single.name.clone(),
                    });
                }
            }
            _ => {}
        }

        for column in &table.columns {
            let lower = column.data_type.to_ascii_lowercase();
            let base = lower.split('(').next().unwrap_or_default().trim();
            let base = base.split_whitespace().next().unwrap_or_default();
            if PRECISION_SENSITIVE.contains(&base) {
                findings.push(Finding::PrecisionSensitive {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    data_type: column.data_type.clone(),
                });
            }
        }

        let mut targets: Vec<String> = Vec::new();
        for fk in &table.foreign_keys {
            if !targets.iter().any(|t| t.eq_ignore_ascii_case(&fk.target_table)) {
                targets.push(fk.target_table.clone());
            }
        }
        if table.foreign_keys.len() >= 2 && targets.len() >= 2 && table.columns.len() <= 4 {
            findings.push(Finding::JunctionTable {
                table: table.name.clone(),
                connects: targets,
            });
        }

        for fk in table.self_references() {
            findings.push(Finding::Hierarchy {
                table: table.name.clone(),
                column: fk.column.clone(),
            });
        }

        let incoming = schema.incoming_foreign_keys(&table.name).len();
        let outgoing = table.foreign_keys.len();
        if incoming + outgoing > 3 {
            findings.push(Finding::HighConnectivity {
                table: table.name.clone(),
                incoming,
                outgoing,
            });
        }
    }

    log::debug!("schema analysis: {} findings", findings.len());
    SchemaAnalysis {
        levels: dependency_levels(schema),
        findings,
    }
}

/// Group tables by foreign-key depth. Root tables (no parents) are level 0;
/// a child sits one level below its deepest parent. Self references are
/// ignored and tables caught in a cycle go after the deepest level.
/// Within a level, tables keep declaration order.
pub fn dependency_levels(schema: &RelationalSchema) -> Vec<Vec<String>> {
    let tables = schema.tables();
    if tables.is_empty() {
        return vec![];
    }

    // child -> parents (FK targets)
    let parents: Vec<BTreeSet<usize>> = tables
        .iter()
        .enumerate()
        .map(|(idx, table)| {
            table
                .foreign_keys
                .iter()
                .filter_map(|fk| schema.position(&fk.target_table))
                .filter(|&target| target != idx)
                .collect()
        })
        .collect();

    let mut levels: HashMap<usize, usize> = HashMap::new();
    let mut changed = true;
    while changed {
        changed = false;
        for (idx, deps) in parents.iter().enumerate() {
            if levels.contains_key(&idx) {
                continue;
            }
            let parent_levels: Vec<usize> = deps.iter().filter_map(|p| levels.get(p).copied()).collect();
            if parent_levels.len() == deps.len() {
                let level = parent_levels.iter().max().map_or(0, |max| max + 1);
                levels.insert(idx, level);
                changed = true;
            }
        }
    }

    // Circular dependencies: after the deepest level
    let cycle_level = levels.values().copied().max().map_or(0, |max| max + 1);
    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, table) in tables.iter().enumerate() {
        let level = levels.get(&idx).copied().unwrap_or(cycle_level);
        if rows.len() <= level {
            rows.resize_with(level + 1, Vec::new);
        }
        rows[level].push(table.name.clone());
    }

    rows.into_iter().filter(|r| !r.is_empty()).collect()
}
