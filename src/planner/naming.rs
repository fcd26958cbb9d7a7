//! Column and table naming within one logical table.

use crate::ir::fit_table_name;
use std::collections::{BTreeMap, HashSet};

/// Hands out unique column names for one table in the order they are requested.
#[derive(Debug, Default)]
pub struct ColumnNamer {
    used: HashSet<String>,
}

impl ColumnNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `bare` when free, otherwise `{alias}_{bare}`, otherwise a numeric suffix.
    pub fn preferring_bare(&mut self, alias: &str, bare: &str) -> String {
        if self.is_free(bare) {
            return self.take(bare.to_string());
        }
        self.prefixed(alias, bare)
    }

    /// `{alias}_{bare}`, with a numeric suffix when taken.
    pub fn prefixed(&mut self, alias: &str, bare: &str) -> String {
        let name = format!("{}_{}", alias, bare);
        let name = self.unique(&name);
        self.take(name)
    }

    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_ascii_lowercase());
    }

    fn is_free(&self, name: &str) -> bool {
        !self.used.contains(&name.to_ascii_lowercase())
    }

    fn unique(&self, base: &str) -> String {
        if self.is_free(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| self.is_free(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn take(&mut self, name: String) -> String {
        self.reserve(&name);
        name
    }
}

/// Assign final table names in emission order: the first table keeps its
/// base name, later tables with the same base get `_2`, `_3`, ...
pub fn assign_table_names(base_names: &[String]) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(base_names.len());

    for base in base_names {
        let count = seen.entry(base.to_ascii_lowercase()).or_insert(0);
        *count += 1;
        let mut n = *count;
        let mut name = if n == 1 {
            fit_table_name(base)
        } else {
            fit_table_name(&format!("{}_{}", base, n))
        };
        while taken.contains(&name.to_ascii_lowercase()) {
            n += 1;
            name = fit_table_name(&format!("{}_{}", base, n));
        }
        taken.insert(name.to_ascii_lowercase());
        names.push(name);
    }

    names
}
