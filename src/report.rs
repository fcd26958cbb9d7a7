//! Rationale report: why each table looks the way it does.

use crate::analysis::SchemaAnalysis;
use crate::ir::{ConversionResult, LogicalTable, TableOrigin};
use crate::measure::TextTable;
use std::fmt;

pub struct Report<'a> {
    pub keyspace: &'a str,
    pub result: &'a ConversionResult,
    /// Every query line of the corpus with its index, parsed or not.
    pub queries: &'a [(usize, String)],
    pub analysis: &'a SchemaAnalysis,
}

fn pattern_list(indices: impl IntoIterator<Item = usize>) -> String {
    let labels: Vec<String> = indices.into_iter().map(|i| format!("Q{}", i)).collect();
    labels.join(", ")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

impl Report<'_> {
    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relational: usize = self.analysis.levels.iter().map(Vec::len).sum();
        let fallback = self
            .result
            .tables
            .iter()
            .filter(|t| matches!(t.origin, TableOrigin::Fallback { .. }))
            .count();
        writeln!(f, "# Conversion report")?;
        writeln!(f)?;
        writeln!(
            f,
            "Keyspace `{}`: {} tables ({} fallback) for {} relational tables. \
             {} of {} query patterns served, {} warnings.",
            self.keyspace,
            self.result.tables.len(),
            fallback,
            relational,
            self.result.serving.len(),
            self.queries.len(),
            self.result.warnings.len()
        )?;
        Ok(())
    }

    fn write_table(&self, f: &mut fmt::Formatter<'_>, table: &LogicalTable) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "### {}", table.name)?;
        writeln!(f)?;
        match table.origin {
            TableOrigin::Query => {
                writeln!(f, "Serves: {}", pattern_list(table.serving.iter().copied()))?;
            }
            TableOrigin::Fallback { .. } => writeln!(
                f,
                "Fallback: no query drives `{}`; it keeps its primary key as partition key.",
                table.driving_table
            )?,
        }
        writeln!(f, "Source tables: {}", table.source_tables().join(", "))?;
        writeln!(f)?;

        let mut columns = TextTable::new(["column", "type", "role", "source"]);
        for c in &table.partition_key {
            columns.row([c.name.clone(), c.cql_type.to_string(), "partition key".to_string(), c.provenance.describe()]);
        }
        for c in &table.clustering_key {
            columns.row([
                c.column.name.clone(),
                c.column.cql_type.to_string(),
                format!("clustering {}", c.order.as_str()),
                c.column.provenance.describe(),
            ]);
        }
        for c in &table.regular_columns {
            let role = if c.is_static { "static" } else { "regular" };
            columns.row([c.name.clone(), c.cql_type.to_string(), role.to_string(), c.provenance.describe()]);
        }
        for c in &table.collections {
            let sources: Vec<String> = c.elements.iter().map(|e| e.provenance.describe()).collect();
            columns.row([
                c.name.clone(),
                c.cql_type(),
                c.kind.as_str().to_string(),
                sources.join("; "),
            ]);
        }
        write!(f, "{}", columns)?;

        if !table.decisions.is_empty() {
            writeln!(f)?;
            writeln!(f, "Join decisions:")?;
            for d in &table.decisions {
                writeln!(f, "- Q{} `{}`: {}, {}", d.pattern, d.join, d.shape.as_str(), d.reason)?;
            }
        }
        Ok(())
    }

    fn write_patterns(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "## Query patterns")?;
        writeln!(f)?;
        if self.queries.is_empty() {
            writeln!(f, "No query patterns; every table is a fallback table.")?;
            return Ok(());
        }
        let mut patterns = TextTable::new(["pattern", "table", "query"]);
        for (index, text) in self.queries {
            let table = self
                .result
                .serving
                .get(index)
                .cloned()
                .unwrap_or_else(|| "(skipped)".to_string());
            patterns.row([format!("Q{}", index), table, escape_cell(text)]);
        }
        write!(f, "{}", patterns)
    }

    fn write_analysis(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "## Schema analysis")?;
        writeln!(f)?;
        writeln!(f, "Dependency levels:")?;
        for (level, tables) in self.analysis.levels.iter().enumerate() {
            writeln!(f, "- level {}: {}", level, tables.join(", "))?;
        }
        if !self.analysis.findings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Findings:")?;
            for finding in &self.analysis.findings {
                writeln!(f, "- {}", finding)?;
            }
        }
        Ok(())
    }

    fn write_warnings(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "## Warnings")?;
        writeln!(f)?;
        if self.result.warnings.is_empty() {
            return writeln!(f, "None.");
        }
        for warning in &self.result.warnings {
            writeln!(f, "- `{}` {}", warning.code(), warning)?;
        }
        Ok(())
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_summary(f)?;
        writeln!(f)?;
        writeln!(f, "## Tables")?;
        for table in &self.result.tables {
            self.write_table(f, table)?;
        }
        self.write_patterns(f)?;
        self.write_analysis(f)?;
        self.write_warnings(f)
    }
}
