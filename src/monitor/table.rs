//! Row-set monitoring of a whole table.
//!
//! The first payload seen for a record is always delivered, flagged as
//! `initial`, even when it carries no rows. Later payloads are folded into
//! the record's [`TableCache`] and delivered only when rows were added,
//! changed or removed.

use serde::{Deserialize, Serialize};

use crate::error::{ContractError, MatchError};
use crate::event::{ChangedValue, EventPayload, EventType, SubscriptionFilter};
use crate::identity::{ElementId, ParamId, ResourceRef};
use crate::registry::CachedValue;
use crate::value::TableRow;

use super::matcher::{ChangeMatcher, DedupGate, Matched};
use super::table_cache::{TableCache, TableDelta};

const TABLE_KEY: &str = "Table";

/// A batch of row changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableChange {
    /// True for the first delivery of a subscription.
    pub initial: bool,
    /// Rows that appeared.
    pub added: Vec<TableRow>,
    /// Rows whose cells changed, with all known cells.
    pub updated: Vec<TableRow>,
    /// Keys of rows that disappeared.
    pub removed: Vec<String>,
    /// The complete row set after the change.
    pub rows: Vec<TableRow>,
}

/// Watches the row set of one table.
#[derive(Debug, Clone)]
pub struct TableMatcher {
    table: ParamId,
}

impl TableMatcher {
    /// Watches `table`. The element must be concrete.
    pub fn new(table: ParamId) -> Result<Self, ContractError> {
        if table.element.is_wildcard() {
            return Err(ContractError::WildcardNotSupported {
                matcher: "TableMatcher".to_string(),
            });
        }
        Ok(Self { table })
    }

    /// The watched table.
    #[must_use]
    pub const fn table(&self) -> ParamId {
        self.table
    }
}

impl ChangeMatcher for TableMatcher {
    type Change = TableChange;

    fn role_suffix(&self) -> &'static str {
        "-Table"
    }

    fn selection(&self) -> String {
        self.table.to_string()
    }

    fn destination(&self) -> Option<ElementId> {
        Some(self.table.element)
    }

    fn filters(&self) -> Vec<SubscriptionFilter> {
        vec![
            SubscriptionFilter::parameter(EventType::ParameterChange, self.table),
            SubscriptionFilter::parameter(EventType::TableUpdate, self.table),
        ]
    }

    fn evaluate(
        &self,
        payload: &EventPayload,
        gate: &DedupGate<'_>,
    ) -> Result<Option<Matched<TableChange>>, MatchError> {
        let (full, updated, deleted): (bool, &[TableRow], &[String]) = match payload {
            EventPayload::ParameterChange(change) if change.param == self.table && change.row_key.is_none() => {
                match &change.value {
                    ChangedValue::Table(rows) => (true, rows, &[]),
                    ChangedValue::Single(value) => {
                        return Err(MatchError::Conversion {
                            expected: "table",
                            actual: value.type_name().to_string(),
                        })
                    }
                }
            }
            EventPayload::TableUpdate(update) if update.table == self.table => {
                (update.full, &update.updated, &update.deleted)
            }
            _ => return Ok(None),
        };

        let applied = gate.update(TABLE_KEY, |slot| {
            let initial = !matches!(slot, Some(CachedValue::Table(_)));
            if initial {
                *slot = Some(CachedValue::Table(TableCache::new()));
            }
            let Some(CachedValue::Table(cache)) = slot else {
                return None;
            };
            let delta = cache.apply(full, updated, deleted);
            if !initial && delta.is_empty() {
                return None;
            }
            Some(into_change(initial, delta, cache))
        });

        match applied.flatten() {
            Some(change) => Ok(Some(Matched::new(ResourceRef::Parameter(self.table), change))),
            None => {
                tracing::debug!(record_id = gate.record_id(), table = %self.table, "unchanged table suppressed");
                Ok(None)
            }
        }
    }
}

fn into_change(initial: bool, delta: TableDelta, cache: &TableCache) -> TableChange {
    TableChange {
        initial,
        added: delta.added,
        updated: delta.updated,
        removed: delta.removed,
        rows: cache.rows().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::event::{ParameterChangeEvent, SubscriptionSetId, TableUpdateEvent};
    use crate::monitor::Monitor;
    use crate::registry::SubscriptionRegistry;
    use crate::transport::{ConnectionHandle, InProcessConnection};
    use crate::value::ParamValue;

    use super::*;

    fn snapshot(table: ParamId, rows: Vec<TableRow>) -> EventPayload {
        EventPayload::ParameterChange(ParameterChangeEvent {
            param: table,
            row_key: None,
            value: ChangedValue::Table(rows),
            alarm_level: None,
        })
    }

    fn update(table: ParamId, updated: Vec<TableRow>, deleted: Vec<&str>) -> EventPayload {
        EventPayload::TableUpdate(TableUpdateEvent {
            table,
            full: false,
            updated,
            deleted: deleted.into_iter().map(str::to_string).collect(),
        })
    }

    #[test]
    fn test_initial_then_deltas() {
        let conn = InProcessConnection::inline();
        let handle: ConnectionHandle = conn.clone();
        let registry = Arc::new(SubscriptionRegistry::new(handle));
        let seen: Arc<Mutex<Vec<TableChange>>> = Arc::new(Mutex::new(Vec::new()));

        let table = ParamId::new(7, 12, 1000);
        let monitor = Monitor::new(registry, "S", TableMatcher::new(table).unwrap());
        let sink = Arc::clone(&seen);
        monitor.start(move |e| sink.lock().push(e.value)).unwrap();

        conn.publish(snapshot(table, vec![])).unwrap();
        conn.publish(update(table, vec![TableRow::new("a").with_cell(2, ParamValue::Int(1))], vec![]))
            .unwrap();
        conn.publish(update(table, vec![TableRow::new("a").with_cell(2, ParamValue::Int(1))], vec![]))
            .unwrap();
        conn.publish(update(table, vec![], vec!["a"])).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].initial);
        assert!(seen[0].rows.is_empty());
        assert!(!seen[1].initial);
        assert_eq!(seen[1].added.len(), 1);
        assert_eq!(seen[2].removed, vec!["a".to_string()]);
        assert!(seen[2].rows.is_empty());
    }

    #[test]
    fn test_scalar_payload_is_a_match_error() {
        let table = ParamId::new(1, 1, 10);
        let conn = InProcessConnection::inline();
        let handle: ConnectionHandle = conn.clone();
        let registry = SubscriptionRegistry::new(handle);
        let gate = DedupGate::new(&registry, "S", "S-1/1/10-Table", SubscriptionSetId::new());
        let payload = EventPayload::ParameterChange(ParameterChangeEvent {
            param: table,
            row_key: None,
            value: ChangedValue::Single(ParamValue::Int(3)),
            alarm_level: None,
        });
        let err = TableMatcher::new(table).unwrap().evaluate(&payload, &gate).unwrap_err();
        assert!(matches!(err, MatchError::Conversion { expected: "table", .. }));
    }
}
