//! Input model for the schema description document.
//!
//! This is the shape produced by hand-authored schema files and by the schema
//! extraction connector alike. Unknown fields are ignored.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaDoc {
    #[serde(default)]
    pub tables: Vec<TableDoc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableDoc {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDoc>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDoc>,
    /// Table-level primary key declaration, in addition to per-column flags.
    #[serde(default)]
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForeignKeyDoc {
    pub column: String,
    pub references: ReferenceDoc,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReferenceDoc {
    pub table: String,
    pub column: String,
}

fn default_nullable() -> bool {
    true
}

impl SchemaDoc {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}
