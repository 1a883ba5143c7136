use std::collections::{BTreeMap, HashMap};

/// Lookup table collapsing equivalent categorical labels onto one canonical spelling.
///
/// Built once from configuration and applied once at load time.
#[derive(Debug, Clone, Default)]
pub struct LabelCanonicalizer {
    by_column: HashMap<String, HashMap<String, String>>,
}

impl LabelCanonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(synonyms: &BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let mut canon = Self::new();
        for (column, table) in synonyms {
            for (from, to) in table {
                canon.insert(column, from, to);
            }
        }
        canon
    }

    pub fn insert(&mut self, column: &str, synonym: &str, canonical: &str) {
        self.by_column
            .entry(column.to_string())
            .or_default()
            .insert(synonym.to_string(), canonical.to_string());
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.by_column.keys().map(|k| k.as_str())
    }

    pub fn canonical<'a>(&'a self, column: &str, label: &'a str) -> &'a str {
        self.by_column
            .get(column)
            .and_then(|t| t.get(label))
            .map(|s| s.as_str())
            .unwrap_or(label)
    }

    /// Rewrite `values` in place; returns how many labels changed.
    pub fn apply(&self, column: &str, values: &mut [Option<String>]) -> usize {
        let Some(table) = self.by_column.get(column) else {
            return 0;
        };
        let mut changed = 0;
        for value in values.iter_mut().flatten() {
            if let Some(canonical) = table.get(value.as_str()) {
                if canonical != value {
                    *value = canonical.clone();
                    changed += 1;
                }
            }
        }
        changed
    }
}
