use std::fmt;
use std::marker::PhantomData;

use crate::error::{ContractError, MatchError};
use crate::event::{ChangedValue, EventPayload, EventType, SubscriptionFilter};
use crate::identity::{ElementId, ParamId, ResourceRef};
use crate::registry::CachedValue;
use crate::value::FromParamValue;

use super::matcher::{ChangeMatcher, DedupGate, Matched};

pub(crate) const RESULT_KEY: &str = "Result";

/// Watches the value of one standalone parameter, delivered as `T`.
///
/// Changes that carry a row key belong to cells and are ignored.
pub struct ParamValueMatcher<T> {
    param: ParamId,
    _value: PhantomData<fn() -> T>,
}

impl<T> ParamValueMatcher<T> {
    /// Watches `param`. The element must be concrete.
    pub fn new(param: ParamId) -> Result<Self, ContractError> {
        if param.element.is_wildcard() {
            return Err(ContractError::WildcardNotSupported {
                matcher: "ParamValueMatcher".to_string(),
            });
        }
        Ok(Self {
            param,
            _value: PhantomData,
        })
    }

    /// The watched parameter.
    #[must_use]
    pub const fn param(&self) -> ParamId {
        self.param
    }
}

impl<T> fmt::Debug for ParamValueMatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamValueMatcher").field("param", &self.param).finish()
    }
}

impl<T> ChangeMatcher for ParamValueMatcher<T>
where
    T: FromParamValue + Clone + fmt::Debug + Send + 'static,
{
    type Change = T;

    fn role_suffix(&self) -> &'static str {
        "-Value"
    }

    fn selection(&self) -> String {
        self.param.to_string()
    }

    fn destination(&self) -> Option<ElementId> {
        Some(self.param.element)
    }

    fn filters(&self) -> Vec<SubscriptionFilter> {
        vec![SubscriptionFilter::parameter(EventType::ParameterChange, self.param)]
    }

    fn evaluate(&self, payload: &EventPayload, gate: &DedupGate<'_>) -> Result<Option<Matched<T>>, MatchError> {
        let EventPayload::ParameterChange(change) = payload else {
            return Ok(None);
        };
        if change.param != self.param || change.row_key.is_some() {
            return Ok(None);
        }
        let raw = match &change.value {
            ChangedValue::Single(value) => value,
            ChangedValue::Table(_) => {
                return Err(MatchError::Conversion {
                    expected: std::any::type_name::<T>(),
                    actual: "table".to_string(),
                })
            }
        };

        let value = T::from_param_value(raw)?;
        if !gate.replace_if_different(RESULT_KEY, CachedValue::Value(raw.clone())) {
            return Ok(None);
        }
        Ok(Some(Matched::new(ResourceRef::Parameter(self.param), value)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::event::ParameterChangeEvent;
    use crate::monitor::Monitor;
    use crate::registry::SubscriptionRegistry;
    use crate::transport::{ConnectionHandle, InProcessConnection};
    use crate::value::ParamValue;

    use super::*;

    fn change(param: ParamId, row_key: Option<&str>, value: ParamValue) -> EventPayload {
        EventPayload::ParameterChange(ParameterChangeEvent {
            param,
            row_key: row_key.map(str::to_string),
            value: ChangedValue::Single(value),
            alarm_level: None,
        })
    }

    #[test]
    fn test_wildcard_rejected() {
        let err = ParamValueMatcher::<f64>::new(ParamId {
            element: ElementId::WILDCARD,
            parameter_id: 10,
        })
        .unwrap_err();
        assert!(matches!(err, ContractError::WildcardNotSupported { .. }));
    }

    #[test]
    fn test_row_keyed_and_unconvertible_changes_are_skipped() {
        let conn = InProcessConnection::inline();
        let handle: ConnectionHandle = conn.clone();
        let registry = Arc::new(SubscriptionRegistry::new(handle));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let param = ParamId::new(7, 12, 500);
        let monitor = Monitor::new(
            Arc::clone(&registry),
            "S",
            ParamValueMatcher::<f64>::new(param).unwrap(),
        );
        assert_eq!(monitor.record_id(), "S-7/12/500-Value");
        let sink = Arc::clone(&seen);
        monitor.start(move |e| sink.lock().push(e.value)).unwrap();

        conn.publish(change(param, Some("row1"), ParamValue::Int(9))).unwrap();
        conn.publish(change(param, None, ParamValue::from("n/a"))).unwrap();
        conn.publish(change(param, None, ParamValue::Float(1.5))).unwrap();

        assert_eq!(*seen.lock(), vec![1.5]);
        assert_eq!(
            registry.cached("S", monitor.record_id(), RESULT_KEY),
            Some(CachedValue::Value(ParamValue::Float(1.5)))
        );
    }
}
