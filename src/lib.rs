pub mod analysis;
pub mod ast;
pub mod config;
pub mod emitter;
pub mod ir;
pub mod measure;
pub mod merge;
pub mod pattern;
pub mod planner;
pub mod report;
pub mod schema;
pub mod sql;
pub mod warning;

use wasm_bindgen::prelude::*;

use analysis::SchemaAnalysis;
use ast::SchemaDoc;
use config::{ConfigError, ConversionConfig};
use emitter::{EmitOptions, Statement};
use ir::{ConversionResult, LogicalTable};
use pattern::{ParseOutcome, QueryPattern};
use planner::Planner;
use report::Report;
use schema::{RelationalSchema, SchemaValidationError};
use serde::Serialize;
use sql::TypeTable;
use std::collections::BTreeMap;
use thiserror::Error;
use validator::Validate;
use warning::Warning;

/// Fatal conversion errors. Everything else is a [`Warning`].
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("schema document is not valid JSON: {0}")]
    SchemaDocument(#[from] serde_json::Error),
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaValidationError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Everything one run produces.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub result: ConversionResult,
    pub statements: Vec<Statement>,
    pub script: String,
    pub report: String,
    pub analysis: SchemaAnalysis,
}

/// Plan, merge and name the target tables for a validated schema and the
/// query lines of a corpus (see [`pattern::split_corpus`]).
pub fn plan(
    schema: &RelationalSchema,
    queries: &[(usize, String)],
    config: &ConversionConfig,
) -> ConversionResult {
    let mut warnings = Vec::new();
    let types = TypeTable::build(schema, &mut warnings);

    let mut patterns: Vec<QueryPattern> = Vec::with_capacity(queries.len());
    for (index, text) in queries {
        match pattern::parse_pattern(*index, text, schema) {
            ParseOutcome::Parsed(p) => patterns.push(p),
            ParseOutcome::Skipped { index, reason, .. } => warnings.push(Warning::QueryParse {
                index,
                reason: reason.to_string(),
            }),
        }
    }
    log::info!(
        "{} of {} query patterns parsed",
        patterns.len(),
        queries.len()
    );

    let planner = Planner::new(schema, &types, &config.attribute_map);
    let planned = planner.plan_all(&patterns, config.workers(patterns.len()));
    let fallback = planner.fallback(&planned);
    log::info!("{} fallback tables", fallback.len());

    let mut tables: Vec<LogicalTable> = Vec::with_capacity(planned.len() + fallback.len());
    for p in planned {
        warnings.extend(p.warnings);
        tables.push(p.table);
    }
    tables.extend(fallback);
    let tables = merge::merge_tables(tables);

    let serving: BTreeMap<usize, String> = tables
        .iter()
        .flat_map(|t| t.serving.iter().map(|&i| (i, t.name.clone())))
        .collect();

    ConversionResult {
        tables,
        serving,
        warnings,
    }
}

/// Run the whole pipeline on a parsed schema document and a query corpus.
pub fn convert(
    doc: &SchemaDoc,
    corpus: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    config.validate().map_err(ConfigError::from)?;
    let schema = RelationalSchema::from_doc(doc)?;
    let queries = pattern::split_corpus(corpus);

    let result = plan(&schema, &queries, config);
    let analysis = analysis::analyze(&schema);
    let statements = emitter::emit(&result.tables, &EmitOptions::from(config));
    let script = emitter::render_script(&statements);
    let report = Report {
        keyspace: &config.keyspace,
        result: &result,
        queries: &queries,
        analysis: &analysis,
    }
    .to_string();

    Ok(ConversionOutput {
        result,
        statements,
        script,
        report,
        analysis,
    })
}

/// [`convert`] on the JSON text of a schema document.
pub fn convert_json(
    schema_json: &str,
    corpus: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let doc = SchemaDoc::from_json(schema_json)?;
    convert(&doc, corpus, config)
}

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

#[derive(Serialize)]
struct WasmOutput<'a> {
    statements: Vec<&'a str>,
    script: &'a str,
    report: &'a str,
    warnings: Vec<String>,
}

/// Convert a schema document and query corpus; returns a JSON document with
/// the statements, the script, the report and the warnings.
#[wasm_bindgen(js_name = "convertSchema")]
pub fn convert_schema(
    schema_json: &str,
    queries: &str,
    keyspace: Option<String>,
) -> Result<String, String> {
    let mut config = ConversionConfig {
        parallelism: 1,
        ..Default::default()
    };
    if let Some(keyspace) = keyspace {
        config.keyspace = keyspace;
    }

    let output = convert_json(schema_json, queries, &config).map_err(|e| e.to_string())?;
    let wasm = WasmOutput {
        statements: output.statements.iter().map(|s| s.text.as_str()).collect(),
        script: &output.script,
        report: &output.report,
        warnings: output.result.warnings.iter().map(|w| w.to_string()).collect(),
    };
    serde_json::to_string(&wasm).map_err(|e| e.to_string())
}
