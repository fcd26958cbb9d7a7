use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Naming conventions of the default attribute-map rule.
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AttributeMapConfig {
    /// Fold name/value child tables into map columns
    pub enabled: bool,

    /// Column names (or `_`-suffixes) that identify the key of a pair
    #[validate(length(min = 1, message = "At least one name hint is required"))]
    pub name_hints: Vec<String>,

    /// Column names (or `_`-suffixes) that identify the value of a pair
    #[validate(length(min = 1, message = "At least one value hint is required"))]
    pub value_hints: Vec<String>,
}

impl Default for AttributeMapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name_hints: ["name", "key", "attribute", "attr", "property", "type", "field"]
                .into_iter()
                .map(String::from)
                .collect(),
            value_hints: ["value", "val"].into_iter().map(String::from).collect(),
        }
    }
}

/// Conversion run configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversionConfig {
    /// Target keyspace; every table statement is qualified with it
    #[validate(custom(function = "validate_identifier"))]
    pub keyspace: String,

    /// Replication factor of the generated keyspace (1-32)
    #[validate(range(
        min = 1,
        max = 32,
        message = "Replication factor must be between 1 and 32"
    ))]
    pub replication_factor: u32,

    /// Whether a CREATE KEYSPACE statement is emitted first
    pub emit_keyspace: bool,

    /// Whether table statements carry IF NOT EXISTS
    pub if_not_exists: bool,

    /// Planning workers; 0 uses one per available core
    #[validate(range(max = 256, message = "Parallelism must be at most 256"))]
    pub parallelism: usize,

    #[validate(nested)]
    pub attribute_map: AttributeMapConfig,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            keyspace: "converted_schema".to_string(),
            replication_factor: 3,
            emit_keyspace: true,
            if_not_exists: true,
            parallelism: 0,
            attribute_map: AttributeMapConfig::default(),
        }
    }
}

impl ConversionConfig {
    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content.to_string(),
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Number of planning workers to use for `patterns` patterns.
    pub fn workers(&self, patterns: usize) -> usize {
        let wanted = match self.parallelism {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };
        wanted.clamp(1, patterns.max(1))
    }
}

/// CQL unquoted identifier: a letter followed by letters, digits or `_`, at most 48 characters.
fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    let mut chars = value.chars();
    let valid = value.len() <= 48
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("identifier");
        err.message = Some(format!("'{}' is not a valid keyspace name", value).into());
        Err(err)
    }
}
