//! Statement emitter: logical tables to CQL definition statements.
//!
//! Every statement is complete on its own and qualified with the keyspace,
//! so a deployment tool can run them one by one and keep going past a
//! failed statement.

use crate::config::ConversionConfig;
use crate::ir::{LogicalTable, TableOrigin};
use serde::Serialize;
use std::fmt::{self, Write};

const RESERVED: &[&str] = &[
    "add", "allow", "alter", "and", "apply", "asc", "authorize", "batch", "begin", "by",
    "columnfamily", "create", "delete", "desc", "describe", "drop", "entries", "execute", "from",
    "full", "grant", "if", "in", "index", "infinity", "insert", "into", "keyspace", "limit",
    "modify", "nan", "norecursive", "not", "null", "of", "on", "or", "order", "primary", "rename",
    "replace", "revoke", "schema", "select", "set", "table", "to", "token", "truncate", "unlogged",
    "update", "use", "using", "where", "with",
];

/// Identifier as it must appear in CQL: quoted unless it is a plain
/// lowercase name that is not reserved.
pub fn quote_identifier(name: &str) -> String {
    let plain = name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain && !RESERVED.contains(&name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    pub keyspace: String,
    pub replication_factor: u32,
    pub emit_keyspace: bool,
    pub if_not_exists: bool,
}

impl From<&ConversionConfig> for EmitOptions {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            keyspace: config.keyspace.clone(),
            replication_factor: config.replication_factor,
            emit_keyspace: config.emit_keyspace,
            if_not_exists: config.if_not_exists,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Keyspace,
    Table,
}

/// One independently executable statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: Option<String>,
    /// Query patterns served by the table.
    pub serves: Vec<usize>,
    pub text: String,
}

impl Statement {
    fn comment(&self) -> String {
        match (self.kind, &self.table) {
            (StatementKind::Keyspace, _) => "-- keyspace".to_string(),
            (StatementKind::Table, Some(table)) if self.serves.is_empty() => {
                format!("-- {}: relational table, no query drives it", table)
            }
            (StatementKind::Table, table) => {
                let serves: Vec<String> = self.serves.iter().map(|i| format!("Q{}", i)).collect();
                format!(
                    "-- {}: serves {}",
                    table.as_deref().unwrap_or_default(),
                    serves.join(", ")
                )
            }
        }
    }
}

/// Statements for `tables`, which must already be in emission order.
pub fn emit(tables: &[LogicalTable], options: &EmitOptions) -> Vec<Statement> {
    let mut statements = Vec::with_capacity(tables.len() + 1);
    let keyspace = quote_identifier(&options.keyspace);

    if options.emit_keyspace {
        statements.push(Statement {
            kind: StatementKind::Keyspace,
            table: None,
            serves: Vec::new(),
            text: format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = {{'class': 'SimpleStrategy', 'replication_factor': {}}};",
                keyspace, options.replication_factor
            ),
        });
    }

    for table in tables {
        let text = TableStatement {
            keyspace: &keyspace,
            table,
            if_not_exists: options.if_not_exists,
        }
        .to_string();
        statements.push(Statement {
            kind: StatementKind::Table,
            table: Some(table.name.clone()),
            serves: match table.origin {
                TableOrigin::Query => table.serving.iter().copied().collect(),
                TableOrigin::Fallback { .. } => Vec::new(),
            },
            text,
        });
    }

    log::info!("emitted {} statements", statements.len());
    statements
}

/// All statements as one script, each preceded by a comment line.
pub fn render_script(statements: &[Statement]) -> String {
    let mut script = String::new();
    for (i, statement) in statements.iter().enumerate() {
        if i > 0 {
            script.push('\n');
        }
        script.push_str(&statement.comment());
        script.push('\n');
        script.push_str(&statement.text);
        script.push('\n');
    }
    script
}

struct TableStatement<'a> {
    keyspace: &'a str,
    table: &'a LogicalTable,
    if_not_exists: bool,
}

impl fmt::Display for TableStatement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table;
        let if_not_exists = if self.if_not_exists { "IF NOT EXISTS " } else { "" };
        writeln!(
            f,
            "CREATE TABLE {}{}.{} (",
            if_not_exists,
            self.keyspace,
            quote_identifier(&table.name)
        )?;

        for column in &table.partition_key {
            writeln!(f, "    {} {},", quote_identifier(&column.name), column.cql_type)?;
        }
        for clustering in &table.clustering_key {
            let column = &clustering.column;
            writeln!(f, "    {} {},", quote_identifier(&column.name), column.cql_type)?;
        }
        for column in &table.regular_columns {
            let modifier = if column.is_static { " STATIC" } else { "" };
            writeln!(
                f,
                "    {} {}{},",
                quote_identifier(&column.name),
                column.cql_type,
                modifier
            )?;
        }
        for collection in &table.collections {
            writeln!(
                f,
                "    {} {},",
                quote_identifier(&collection.name),
                collection.cql_type()
            )?;
        }

        let partition: Vec<String> = table
            .partition_key
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect();
        let mut primary_key = format!("({})", partition.join(", "));
        for clustering in &table.clustering_key {
            write!(primary_key, ", {}", quote_identifier(&clustering.column.name))?;
        }
        writeln!(f, "    PRIMARY KEY ({})", primary_key)?;

        if table.clustering_key.is_empty() {
            write!(f, ");")
        } else {
            let order: Vec<String> = table
                .clustering_key
                .iter()
                .map(|c| format!("{} {}", quote_identifier(&c.column.name), c.order.as_str()))
                .collect();
            write!(f, ") WITH CLUSTERING ORDER BY ({});", order.join(", "))
        }
    }
}
