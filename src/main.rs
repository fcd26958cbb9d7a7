use anyhow::Context;
use clap::Parser;
use relcass::ast::SchemaDoc;
use relcass::config::ConversionConfig;
use std::fs;
use std::path::PathBuf;

/// relcass - compile a relational schema and its queries into a Cassandra schema
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema description document (JSON)
    #[arg(long, short = 's')]
    schema: PathBuf,

    /// Query corpus, one SQL query per line
    #[arg(long, short = 'q')]
    queries: Option<PathBuf>,

    /// Write the CQL script here instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Write the conversion report (markdown) here
    #[arg(long, short = 'r')]
    report: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Target keyspace, overrides the configuration file
    #[arg(long, short = 'k')]
    keyspace: Option<String>,

    /// Planning threads; 0 uses every available core
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Do not emit the CREATE KEYSPACE statement
    #[arg(long)]
    no_keyspace: bool,
}

impl Cli {
    fn config(&self) -> anyhow::Result<ConversionConfig> {
        let mut config = match &self.config {
            Some(path) => ConversionConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ConversionConfig::default(),
        };
        if let Some(keyspace) = &self.keyspace {
            config.keyspace = keyspace.clone();
        }
        if let Some(jobs) = self.jobs {
            config.parallelism = jobs;
        }
        if self.no_keyspace {
            config.emit_keyspace = false;
        }
        Ok(config)
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config()?;

    let schema_text = fs::read_to_string(&cli.schema)
        .with_context(|| format!("Failed to read {}", cli.schema.display()))?;
    let doc = SchemaDoc::from_json(&schema_text)
        .with_context(|| format!("Failed to parse {}", cli.schema.display()))?;
    let corpus = match &cli.queries {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let output = relcass::convert(&doc, &corpus, &config)?;

    match &cli.output {
        Some(path) => fs::write(path, &output.script)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", output.script),
    }
    if let Some(path) = &cli.report {
        fs::write(path, &output.report)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let warnings = &output.result.warnings;
    if !warnings.is_empty() {
        eprintln!("{} warnings:", warnings.len());
        for warning in warnings {
            eprintln!("  [{}] {}", warning.code(), warning);
        }
    }
    Ok(())
}

fn main() {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
