//! Raw event and filter types exchanged with the transport.
//!
//! Inbound messages are opaque to the engine except for their type tag and
//! identity fields. They are modelled as a closed tagged union so each matcher
//! can pattern-match on exactly the categories it understands.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{ElementId, ParamId};
use crate::value::{AlarmLevel, ParamValue, TableRow};

/// Opaque identifier of one subscription set on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionSetId(Uuid);

impl SubscriptionSetId {
    /// Creates a new random set id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an element.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    Undefined,
    Active,
    Hidden,
    Paused,
    Stopped,
    Deleted,
    Error,
    Restarting,
    Masked,
}

impl ElementState {
    /// States after which subscriptions owned by the element are torn down.
    #[must_use]
    pub const fn is_stopped_or_deleted(self) -> bool {
        matches!(self, Self::Stopped | Self::Deleted)
    }
}

/// Lifecycle-state change of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementStateEvent {
    /// The element whose state changed.
    pub element: ElementId,
    /// New state.
    pub state: ElementState,
    /// False while an element reported as active is still starting up.
    #[serde(default = "default_true")]
    pub startup_complete: bool,
}

/// Lightweight element info, carrying the element name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfoEvent {
    /// The element described.
    pub element: ElementId,
    /// Current element name.
    pub name: String,
    /// Current state.
    pub state: ElementState,
}

/// New value of a parameter: a primitive, or a full table snapshot.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum ChangedValue {
    Single(ParamValue),
    Table(Vec<TableRow>),
}

/// Value change of a standalone parameter, a table, or a table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChangeEvent {
    /// Parameter (or column) that changed.
    pub param: ParamId,
    /// Row primary key; present only for cell changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_key: Option<String>,
    /// The new value.
    pub value: ChangedValue,
    /// Alarm level of the parameter or cell, when monitored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_level: Option<AlarmLevel>,
}

/// Incremental (or full) row update of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableUpdateEvent {
    /// The table parameter.
    pub table: ParamId,
    /// True when `updated` is the complete row set.
    #[serde(default)]
    pub full: bool,
    /// Added or updated rows.
    #[serde(default)]
    pub updated: Vec<TableRow>,
    /// Primary keys of deleted rows.
    #[serde(default)]
    pub deleted: Vec<String>,
}

/// Event categories a filter can select.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ElementState,
    ElementInfo,
    ParameterChange,
    TableUpdate,
}

/// Payload of a raw event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ElementState(ElementStateEvent),
    ElementInfo(ElementInfoEvent),
    ParameterChange(ParameterChangeEvent),
    TableUpdate(TableUpdateEvent),
    /// A payload type no matcher understands.
    Unknown { type_tag: String },
}

impl EventPayload {
    /// Discriminator of the payload, `None` for unknown payloads.
    #[must_use]
    pub const fn event_type(&self) -> Option<EventType> {
        match self {
            Self::ElementState(_) => Some(EventType::ElementState),
            Self::ElementInfo(_) => Some(EventType::ElementInfo),
            Self::ParameterChange(_) => Some(EventType::ParameterChange),
            Self::TableUpdate(_) => Some(EventType::TableUpdate),
            Self::Unknown { .. } => None,
        }
    }

    /// The element the payload concerns.
    #[must_use]
    pub const fn element(&self) -> Option<ElementId> {
        match self {
            Self::ElementState(e) => Some(e.element),
            Self::ElementInfo(e) => Some(e.element),
            Self::ParameterChange(e) => Some(e.param.element),
            Self::TableUpdate(e) => Some(e.table.element),
            Self::Unknown { .. } => None,
        }
    }

    /// The parameter the payload concerns, if any.
    #[must_use]
    pub const fn param(&self) -> Option<ParamId> {
        match self {
            Self::ParameterChange(e) => Some(e.param),
            Self::TableUpdate(e) => Some(e.table),
            _ => None,
        }
    }
}

/// An event delivered by the transport for one subscription set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// The set the transport matched this event against.
    pub set_id: SubscriptionSetId,
    /// The payload.
    pub payload: EventPayload,
    /// When the transport received the event.
    pub received_at: DateTime<Utc>,
}

impl RawEvent {
    /// Stamps a payload with a set id.
    #[must_use]
    pub fn new(set_id: SubscriptionSetId, payload: EventPayload) -> Self {
        Self {
            set_id,
            payload,
            received_at: Utc::now(),
        }
    }

    /// JSON rendering for diagnostics.
    #[must_use]
    pub fn to_log_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable event: {e}>"))
    }
}

/// Identity part of a filter.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterTarget {
    /// Every resource of the event type.
    Any,
    Element { element: ElementId },
    Parameter { param: ParamId },
    Cell { param: ParamId, row_key: String },
}

/// One (event type, identity predicate) pair of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Event category.
    pub event_type: EventType,
    /// Identity predicate.
    pub target: FilterTarget,
}

impl SubscriptionFilter {
    /// Filter on every resource of a type.
    #[must_use]
    pub const fn any(event_type: EventType) -> Self {
        Self {
            event_type,
            target: FilterTarget::Any,
        }
    }

    /// Filter on one element, or every element for the wildcard.
    #[must_use]
    pub const fn element(event_type: EventType, element: ElementId) -> Self {
        if element.is_wildcard() {
            return Self::any(event_type);
        }
        Self {
            event_type,
            target: FilterTarget::Element { element },
        }
    }

    /// Filter on one parameter.
    #[must_use]
    pub const fn parameter(event_type: EventType, param: ParamId) -> Self {
        Self {
            event_type,
            target: FilterTarget::Parameter { param },
        }
    }

    /// Filter on one cell of a column.
    #[must_use]
    pub fn cell(event_type: EventType, column: ParamId, row_key: impl Into<String>) -> Self {
        Self {
            event_type,
            target: FilterTarget::Cell {
                param: column,
                row_key: row_key.into(),
            },
        }
    }

    /// Returns true if the transport should forward `payload` under this filter.
    #[must_use]
    pub fn matches(&self, payload: &EventPayload) -> bool {
        if payload.event_type() != Some(self.event_type) {
            return false;
        }
        match &self.target {
            FilterTarget::Any => true,
            FilterTarget::Element { element } => payload.element() == Some(*element),
            FilterTarget::Parameter { param } => payload.param() == Some(*param),
            FilterTarget::Cell { param, row_key } => match payload {
                EventPayload::ParameterChange(e) => {
                    e.param == *param && e.row_key.as_deref() == Some(row_key.as_str())
                }
                _ => false,
            },
        }
    }
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param_change(param: ParamId, row_key: Option<&str>) -> EventPayload {
        EventPayload::ParameterChange(ParameterChangeEvent {
            param,
            row_key: row_key.map(str::to_string),
            value: ChangedValue::Single(ParamValue::Int(1)),
            alarm_level: None,
        })
    }

    #[test]
    fn test_filter_matches_by_type_and_identity() {
        let p = ParamId::new(7, 12, 500);
        let f = SubscriptionFilter::parameter(EventType::ParameterChange, p);
        assert!(f.matches(&param_change(p, None)));
        assert!(!f.matches(&param_change(ParamId::new(7, 12, 501), None)));

        let state = EventPayload::ElementState(ElementStateEvent {
            element: p.element,
            state: ElementState::Active,
            startup_complete: true,
        });
        assert!(!f.matches(&state));
        assert!(SubscriptionFilter::element(EventType::ElementState, p.element).matches(&state));
    }

    #[test]
    fn test_wildcard_element_filter_is_any() {
        let f = SubscriptionFilter::element(EventType::ElementState, ElementId::WILDCARD);
        assert_eq!(f.target, FilterTarget::Any);
        let other = EventPayload::ElementState(ElementStateEvent {
            element: ElementId::new(1, 2),
            state: ElementState::Stopped,
            startup_complete: true,
        });
        assert!(f.matches(&other));
    }

    #[test]
    fn test_cell_filter_requires_row_key() {
        let col = ParamId::new(7, 12, 1002);
        let f = SubscriptionFilter::cell(EventType::ParameterChange, col, "r1");
        assert!(f.matches(&param_change(col, Some("r1"))));
        assert!(!f.matches(&param_change(col, Some("r2"))));
        assert!(!f.matches(&param_change(col, None)));
    }

    #[test]
    fn test_unknown_payload_never_matches() {
        let unknown = EventPayload::Unknown {
            type_tag: "AlarmEventMessage".to_string(),
        };
        assert_eq!(unknown.event_type(), None);
        assert!(!SubscriptionFilter::any(EventType::ElementState).matches(&unknown));
    }

    #[test]
    fn test_raw_event_serde_roundtrip_tagged() {
        let ev = RawEvent::new(SubscriptionSetId::new(), param_change(ParamId::new(1, 2, 3), None));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["payload"]["type"], "parameter_change");
        let back: RawEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
