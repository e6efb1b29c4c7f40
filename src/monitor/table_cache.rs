//! Incremental table row cache.
//!
//! Tables arrive either as a full snapshot or as a partial update listing
//! changed rows and deleted keys. The cache folds both into the current row
//! set and reports what changed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::TableRow;

/// Current rows of one table, keyed by row key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableCache {
    rows: BTreeMap<String, TableRow>,
}

/// Difference produced by applying one update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableDelta {
    /// Rows whose key was not present before.
    pub added: Vec<TableRow>,
    /// Rows whose cells changed.
    pub updated: Vec<TableRow>,
    /// Keys of rows that went away.
    pub removed: Vec<String>,
}

impl TableDelta {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

impl TableCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an update and returns the resulting delta.
    ///
    /// With `full`, `updated` is the complete row set: rows not listed are
    /// removed and `deleted` is ignored. Otherwise listed rows are merged
    /// cell by cell and `deleted` keys are dropped.
    pub fn apply(&mut self, full: bool, updated: &[TableRow], deleted: &[String]) -> TableDelta {
        if full {
            self.snapshot(updated)
        } else {
            self.incremental(updated, deleted)
        }
    }

    fn snapshot(&mut self, rows: &[TableRow]) -> TableDelta {
        let mut next: BTreeMap<String, TableRow> = BTreeMap::new();
        for row in rows {
            next.insert(row.key.clone(), row.clone());
        }

        let mut delta = TableDelta::default();
        for (key, row) in &next {
            match self.rows.get(key) {
                None => delta.added.push(row.clone()),
                Some(old) if old != row => delta.updated.push(row.clone()),
                Some(_) => {}
            }
        }
        delta.removed = self
            .rows
            .keys()
            .filter(|k| !next.contains_key(*k))
            .cloned()
            .collect();

        self.rows = next;
        delta
    }

    fn incremental(&mut self, updated: &[TableRow], deleted: &[String]) -> TableDelta {
        let mut delta = TableDelta::default();

        for row in updated {
            match self.rows.get_mut(&row.key) {
                None => {
                    self.rows.insert(row.key.clone(), row.clone());
                    delta.added.push(row.clone());
                }
                Some(existing) => {
                    let mut changed = false;
                    for (column, value) in &row.cells {
                        if existing.cells.get(column) != Some(value) {
                            existing.cells.insert(*column, value.clone());
                            changed = true;
                        }
                    }
                    if changed {
                        delta.updated.push(existing.clone());
                    }
                }
            }
        }

        for key in deleted {
            if self.rows.remove(key).is_some() {
                delta.removed.push(key.clone());
            }
        }
        delta
    }

    /// Rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = &TableRow> {
        self.rows.values()
    }

    /// Looks up one row.
    #[must_use]
    pub fn row(&self, key: &str) -> Option<&TableRow> {
        self.rows.get(key)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
