use crate::error::{ContractError, MatchError};
use crate::event::{EventPayload, EventType, ParameterChangeEvent, SubscriptionFilter};
use crate::identity::{CellId, ElementId, ParamId, ResourceRef};
use crate::registry::CachedValue;
use crate::value::AlarmLevel;

use super::matcher::{ChangeMatcher, DedupGate, Matched};

const ALARM_KEY: &str = "AlarmState";

/// What an alarm level monitor watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmTarget {
    /// A standalone parameter.
    Parameter(ParamId),
    /// One cell of a table column.
    Cell(CellId),
}

impl AlarmTarget {
    fn element(&self) -> ElementId {
        match self {
            Self::Parameter(param) => param.element,
            Self::Cell(cell) => cell.element(),
        }
    }

    fn matches(&self, change: &ParameterChangeEvent) -> bool {
        match self {
            Self::Parameter(param) => change.param == *param && change.row_key.is_none(),
            Self::Cell(cell) => {
                change.param == cell.column() && change.row_key.as_deref() == Some(cell.row_key.as_str())
            }
        }
    }

    fn resource(&self) -> ResourceRef {
        match self {
            Self::Parameter(param) => ResourceRef::Parameter(*param),
            Self::Cell(cell) => ResourceRef::Cell(cell.clone()),
        }
    }
}

/// Watches the alarm severity of a parameter or cell rather than its value.
///
/// Value changes are expected to carry the alarm level; one without it is
/// reported as a match error.
#[derive(Debug, Clone)]
pub struct AlarmLevelMatcher {
    target: AlarmTarget,
}

impl AlarmLevelMatcher {
    /// Watches `target`. The element must be concrete.
    pub fn new(target: AlarmTarget) -> Result<Self, ContractError> {
        if target.element().is_wildcard() {
            return Err(ContractError::WildcardNotSupported {
                matcher: "AlarmLevelMatcher".to_string(),
            });
        }
        Ok(Self { target })
    }

    /// The watched parameter or cell.
    #[must_use]
    pub const fn target(&self) -> &AlarmTarget {
        &self.target
    }
}

impl ChangeMatcher for AlarmLevelMatcher {
    type Change = AlarmLevel;

    fn role_suffix(&self) -> &'static str {
        "-AlarmLevel"
    }

    fn selection(&self) -> String {
        match &self.target {
            AlarmTarget::Parameter(param) => param.to_string(),
            AlarmTarget::Cell(cell) => cell.to_string(),
        }
    }

    fn destination(&self) -> Option<ElementId> {
        Some(self.target.element())
    }

    fn filters(&self) -> Vec<SubscriptionFilter> {
        let filter = match &self.target {
            AlarmTarget::Parameter(param) => SubscriptionFilter::parameter(EventType::ParameterChange, *param),
            AlarmTarget::Cell(cell) => {
                SubscriptionFilter::cell(EventType::ParameterChange, cell.column(), cell.row_key.clone())
            }
        };
        vec![filter]
    }

    fn evaluate(
        &self,
        payload: &EventPayload,
        gate: &DedupGate<'_>,
    ) -> Result<Option<Matched<AlarmLevel>>, MatchError> {
        let EventPayload::ParameterChange(change) = payload else {
            return Ok(None);
        };
        if !self.target.matches(change) {
            return Ok(None);
        }
        let level = change.alarm_level.ok_or(MatchError::MissingField { field: "alarm_level" })?;

        if !gate.replace_if_different(ALARM_KEY, CachedValue::Alarm(level)) {
            return Ok(None);
        }
        Ok(Some(Matched::new(self.target.resource(), level)))
    }
}
