//! Recoverable diagnostics recorded during a conversion run.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum Warning {
    #[error("Q{index}: query skipped, {reason}")]
    QueryParse { index: usize, reason: String },

    #[error("{table}.{column}: unsupported type '{original}' approximated as text")]
    UnsupportedType {
        table: String,
        column: String,
        original: String,
    },

    #[error(
        "Q{index}: self reference {table}.{column} materialized to depth {depth}; deeper levels the schema allows are not materialized"
    )]
    UnmaterializedRecursion {
        index: usize,
        table: String,
        column: String,
        depth: usize,
    },

    #[error("Q{index}: OFFSET has no wide-column equivalent and was dropped; LIMIT is kept, page with the last clustering value instead")]
    OffsetUnsupported { index: usize },

    #[error("Q{index}: no equality filter on '{table}', keyed by its primary key instead")]
    NoPartitionKey { index: usize, table: String },

    #[error("Q{index}: join condition {condition} is not connected to the driving table and was ignored")]
    DetachedJoin { index: usize, condition: String },
}

impl Warning {
    /// Short name of the diagnostic, as used in the report.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueryParse { .. } => "QueryParseError",
            Self::UnsupportedType { .. } => "UnsupportedTypeWarning",
            Self::UnmaterializedRecursion { .. } => "UnmaterializedRecursionWarning",
            Self::OffsetUnsupported { .. } => "OffsetUnsupportedWarning",
            Self::NoPartitionKey { .. } => "NoPartitionKeyWarning",
            Self::DetachedJoin { .. } => "DetachedJoinWarning",
        }
    }

    /// Query pattern the warning refers to, if any.
    pub fn pattern_index(&self) -> Option<usize> {
        match self {
            Self::QueryParse { index, .. }
            | Self::UnmaterializedRecursion { index, .. }
            | Self::OffsetUnsupported { index }
            | Self::NoPartitionKey { index, .. }
            | Self::DetachedJoin { index, .. } => Some(*index),
            Self::UnsupportedType { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_message_mentions_limit_and_offset() {
        let w = Warning::OffsetUnsupported { index: 4 };
        let text = w.to_string();
        assert!(text.starts_with("Q4:"));
        assert!(text.contains("OFFSET"));
        assert!(text.contains("LIMIT is kept"));
        assert_eq!(w.code(), "OffsetUnsupportedWarning");
        assert_eq!(w.pattern_index(), Some(4));
    }

    #[test]
    fn test_type_warning_names_column() {
        let w = Warning::UnsupportedType {
            table: "events".to_string(),
            column: "payload".to_string(),
            original: "jsonb".to_string(),
        };
        assert_eq!(
            w.to_string(),
            "events.payload: unsupported type 'jsonb' approximated as text"
        );
        assert_eq!(w.pattern_index(), None);
    }
}
