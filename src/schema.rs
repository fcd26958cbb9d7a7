//! Validated relational graph.
//!
//! Tables are owned by the schema and addressed by name; foreign keys are
//! stored as name pairs, never as references between tables, so self
//! references and cycles need no special handling here.

use crate::ast::SchemaDoc;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaValidationError {
    #[error("Table '{table}' has no columns")]
    EmptyTable { table: String },
    #[error("Table '{table}' is declared more than once")]
    DuplicateTable { table: String },
    #[error("Column '{column}' is declared more than once in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    #[error("Primary key column '{column}' does not exist in table '{table}'")]
    MissingPrimaryKeyColumn { table: String, column: String },
    #[error("Foreign key column '{column}' does not exist in table '{table}'")]
    MissingForeignKeyColumn { table: String, column: String },
    #[error("Foreign key {table}.{column} references unknown table '{target}'")]
    UnknownTargetTable {
        table: String,
        column: String,
        target: String,
    },
    #[error("Foreign key {table}.{column} references unknown column '{target}.{target_column}'")]
    UnknownTargetColumn {
        table: String,
        column: String,
        target: String,
        target_column: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub target_table: String,
    pub target_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// A foreign key seen from the table it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingKey {
    pub source_table: String,
    pub source_column: String,
    pub target_column: String,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary key columns in declaration order.
    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    pub fn primary_key_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// True when `column` alone is the whole primary key.
    pub fn is_sole_key(&self, column: &str) -> bool {
        let pk = self.primary_key();
        pk.len() == 1 && pk[0].name.eq_ignore_ascii_case(column)
    }

    pub fn is_foreign_key_column(&self, column: &str) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.column.eq_ignore_ascii_case(column))
    }

    /// Foreign key on `column` pointing at `target_table.target_column`, if any.
    pub fn foreign_key_to(
        &self,
        column: &str,
        target_table: &str,
        target_column: &str,
    ) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| {
            fk.column.eq_ignore_ascii_case(column)
                && fk.target_table.eq_ignore_ascii_case(target_table)
                && fk.target_column.eq_ignore_ascii_case(target_column)
        })
    }

    pub fn self_references(&self) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(|fk| fk.target_table.eq_ignore_ascii_case(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct RelationalSchema {
    tables: Vec<Table>,
    by_name: HashMap<String, usize>,
    incoming: HashMap<String, Vec<IncomingKey>>,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl RelationalSchema {
    /// Build and validate the relational graph.
    pub fn from_doc(doc: &SchemaDoc) -> Result<Self, SchemaValidationError> {
        let mut tables = Vec::with_capacity(doc.tables.len());
        let mut by_name = HashMap::new();

        for table_doc in &doc.tables {
            if by_name.contains_key(&key(&table_doc.name)) {
                return Err(SchemaValidationError::DuplicateTable {
                    table: table_doc.name.clone(),
                });
            }
            if table_doc.columns.is_empty() {
                return Err(SchemaValidationError::EmptyTable {
                    table: table_doc.name.clone(),
                });
            }

            let mut columns: Vec<Column> = Vec::with_capacity(table_doc.columns.len());
            for col in &table_doc.columns {
                if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&col.name)) {
                    return Err(SchemaValidationError::DuplicateColumn {
                        table: table_doc.name.clone(),
                        column: col.name.clone(),
                    });
                }
                columns.push(Column {
                    name: col.name.clone(),
                    data_type: col.typ.clone(),
                    nullable: col.nullable && !col.primary_key,
                    primary_key: col.primary_key,
                });
            }

            for pk_name in &table_doc.primary_key {
                match columns
                    .iter_mut()
                    .find(|c| c.name.eq_ignore_ascii_case(pk_name))
                {
                    Some(col) => {
                        col.primary_key = true;
                        col.nullable = false;
                    }
                    None => {
                        return Err(SchemaValidationError::MissingPrimaryKeyColumn {
                            table: table_doc.name.clone(),
                            column: pk_name.clone(),
                        });
                    }
                }
            }

            let foreign_keys = table_doc
                .foreign_keys
                .iter()
                .map(|fk| ForeignKey {
                    column: fk.column.clone(),
                    target_table: fk.references.table.clone(),
                    target_column: fk.references.column.clone(),
                })
                .collect();

            by_name.insert(key(&table_doc.name), tables.len());
            tables.push(Table {
                name: table_doc.name.clone(),
                columns,
                foreign_keys,
            });
        }

        // Foreign keys are checked once every table is known, so forward
        // references and self references validate the same way.
        let mut incoming: HashMap<String, Vec<IncomingKey>> = HashMap::new();
        for table in &tables {
            for fk in &table.foreign_keys {
                if !table.has_column(&fk.column) {
                    return Err(SchemaValidationError::MissingForeignKeyColumn {
                        table: table.name.clone(),
                        column: fk.column.clone(),
                    });
                }
                let target = by_name
                    .get(&key(&fk.target_table))
                    .map(|&idx| &tables[idx])
                    .ok_or_else(|| SchemaValidationError::UnknownTargetTable {
                        table: table.name.clone(),
                        column: fk.column.clone(),
                        target: fk.target_table.clone(),
                    })?;
                if !target.has_column(&fk.target_column) {
                    return Err(SchemaValidationError::UnknownTargetColumn {
                        table: table.name.clone(),
                        column: fk.column.clone(),
                        target: fk.target_table.clone(),
                        target_column: fk.target_column.clone(),
                    });
                }
                incoming
                    .entry(key(&target.name))
                    .or_default()
                    .push(IncomingKey {
                        source_table: table.name.clone(),
                        source_column: fk.column.clone(),
                        target_column: fk.target_column.clone(),
                    });
            }
        }

        log::debug!(
            "schema validated: {} tables, {} foreign keys",
            tables.len(),
            incoming.values().map(Vec::len).sum::<usize>()
        );

        Ok(Self {
            tables,
            by_name,
            incoming,
        })
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.by_name.get(&key(name)).map(|&idx| &self.tables[idx])
    }

    /// Declaration index of a table.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(&key(name)).copied()
    }

    /// Foreign keys pointing into `name`, in declaration order of their source tables.
    pub fn incoming_foreign_keys(&self, name: &str) -> &[IncomingKey] {
        self.incoming
            .get(&key(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn primary_key(&self, name: &str) -> Option<Vec<&Column>> {
        self.table(name).map(Table::primary_key)
    }
}
