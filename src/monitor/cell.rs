use std::fmt;
use std::marker::PhantomData;

use crate::error::{ContractError, MatchError};
use crate::event::{ChangedValue, EventPayload, EventType, SubscriptionFilter};
use crate::identity::{CellId, ElementId, ResourceRef};
use crate::registry::CachedValue;
use crate::value::{FromParamValue, ParamValue};

use super::matcher::{ChangeMatcher, DedupGate, Matched};
use super::param::RESULT_KEY;

/// Watches one table cell, delivered as `T`.
///
/// The cell is fed both by cell value changes and by table updates that
/// carry its row.
pub struct CellValueMatcher<T> {
    cell: CellId,
    _value: PhantomData<fn() -> T>,
}

impl<T> CellValueMatcher<T> {
    /// Watches `cell`. The element must be concrete.
    pub fn new(cell: CellId) -> Result<Self, ContractError> {
        if cell.element().is_wildcard() {
            return Err(ContractError::WildcardNotSupported {
                matcher: "CellValueMatcher".to_string(),
            });
        }
        Ok(Self {
            cell,
            _value: PhantomData,
        })
    }

    /// The watched cell.
    #[must_use]
    pub const fn cell(&self) -> &CellId {
        &self.cell
    }

    fn raw_value<'e>(&self, payload: &'e EventPayload) -> Result<Option<&'e ParamValue>, MatchError> {
        match payload {
            EventPayload::ParameterChange(change) => {
                if change.param != self.cell.column()
                    || change.row_key.as_deref() != Some(self.cell.row_key.as_str())
                {
                    return Ok(None);
                }
                match &change.value {
                    ChangedValue::Single(value) => Ok(Some(value)),
                    ChangedValue::Table(_) => Err(MatchError::Conversion {
                        expected: std::any::type_name::<T>(),
                        actual: "table".to_string(),
                    }),
                }
            }
            EventPayload::TableUpdate(update) if update.table == self.cell.table => Ok(update
                .updated
                .iter()
                .find(|row| row.key == self.cell.row_key)
                .and_then(|row| row.cell(self.cell.column_id))),
            _ => Ok(None),
        }
    }
}

impl<T> fmt::Debug for CellValueMatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellValueMatcher").field("cell", &self.cell).finish()
    }
}

impl<T> ChangeMatcher for CellValueMatcher<T>
where
    T: FromParamValue + Clone + fmt::Debug + Send + 'static,
{
    type Change = T;

    fn role_suffix(&self) -> &'static str {
        "-Value"
    }

    fn selection(&self) -> String {
        self.cell.to_string()
    }

    fn destination(&self) -> Option<ElementId> {
        Some(self.cell.element())
    }

    fn filters(&self) -> Vec<SubscriptionFilter> {
        vec![
            SubscriptionFilter::cell(EventType::ParameterChange, self.cell.column(), self.cell.row_key.clone()),
            SubscriptionFilter::parameter(EventType::TableUpdate, self.cell.table),
        ]
    }

    fn evaluate(&self, payload: &EventPayload, gate: &DedupGate<'_>) -> Result<Option<Matched<T>>, MatchError> {
        let Some(raw) = self.raw_value(payload)? else {
            return Ok(None);
        };
        let value = T::from_param_value(raw)?;
        if !gate.replace_if_different(RESULT_KEY, CachedValue::Value(raw.clone())) {
            return Ok(None);
        }
        Ok(Some(Matched::new(ResourceRef::Cell(self.cell.clone()), value)))
    }
}
