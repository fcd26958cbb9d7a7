//! The attribute-map rule: when a one-to-many child is a bag of name/value pairs.

use crate::config::AttributeMapConfig;
use crate::schema::{Column, Table};

/// Decides whether child rows reached through `join_column` are homogeneous
/// name/value pairs. Returns the `(name, value)` columns when they are.
pub trait AttributePairRule: Send + Sync {
    fn attribute_pair<'t>(&self, child: &'t Table, join_column: &str)
    -> Option<(&'t Column, &'t Column)>;
}

/// Pairs are recognised by column naming: the child must have exactly two
/// columns outside its primary and foreign keys, one matching a name hint
/// and the other a value hint.
#[derive(Debug, Clone)]
pub struct NamingConventionRule {
    enabled: bool,
    name_hints: Vec<String>,
    value_hints: Vec<String>,
}

impl NamingConventionRule {
    pub fn from_config(config: &AttributeMapConfig) -> Self {
        Self {
            enabled: config.enabled,
            name_hints: config.name_hints.iter().map(|h| h.to_ascii_lowercase()).collect(),
            value_hints: config.value_hints.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    fn matches(hints: &[String], column: &str) -> bool {
        let column = column.to_ascii_lowercase();
        hints
            .iter()
            .any(|h| column == *h || column.ends_with(&format!("_{}", h)))
    }
}

impl AttributePairRule for NamingConventionRule {
    fn attribute_pair<'t>(
        &self,
        child: &'t Table,
        join_column: &str,
    ) -> Option<(&'t Column, &'t Column)> {
        if !self.enabled {
            return None;
        }

        let payload: Vec<&Column> = child
            .columns
            .iter()
            .filter(|c| {
                !c.primary_key
                    && !child.is_foreign_key_column(&c.name)
                    && !c.name.eq_ignore_ascii_case(join_column)
            })
            .collect();

        let [a, b] = payload.as_slice() else {
            return None;
        };
        if Self::matches(&self.name_hints, &a.name) && Self::matches(&self.value_hints, &b.name) {
            Some((a, b))
        } else if Self::matches(&self.name_hints, &b.name)
            && Self::matches(&self.value_hints, &a.name)
        {
            Some((b, a))
        } else {
            None
        }
    }
}
