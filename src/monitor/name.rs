use crate::error::MatchError;
use crate::event::{EventPayload, EventType, SubscriptionFilter};
use crate::identity::{ElementId, ResourceRef};
use crate::registry::CachedValue;

use super::matcher::{ChangeMatcher, DedupGate, Matched};

/// Watches element names through lightweight info events.
#[derive(Debug, Clone)]
pub struct ElementNameMatcher {
    element: ElementId,
}

impl ElementNameMatcher {
    /// Watches `element`; [`ElementId::WILDCARD`] watches all elements.
    #[must_use]
    pub const fn new(element: ElementId) -> Self {
        Self { element }
    }
}

impl ChangeMatcher for ElementNameMatcher {
    type Change = String;

    fn role_suffix(&self) -> &'static str {
        "-Name"
    }

    fn selection(&self) -> String {
        self.element.to_string()
    }

    fn destination(&self) -> Option<ElementId> {
        (!self.element.is_wildcard()).then_some(self.element)
    }

    fn filters(&self) -> Vec<SubscriptionFilter> {
        vec![SubscriptionFilter::element(EventType::ElementInfo, self.element)]
    }

    fn evaluate(&self, payload: &EventPayload, gate: &DedupGate<'_>) -> Result<Option<Matched<String>>, MatchError> {
        let EventPayload::ElementInfo(info) = payload else {
            return Ok(None);
        };
        if !self.element.is_wildcard() && info.element != self.element {
            return Ok(None);
        }

        let key = info.element.to_string();
        if !gate.replace_if_different(&key, CachedValue::Name(info.name.clone())) {
            return Ok(None);
        }
        Ok(Some(Matched::new(ResourceRef::Element(info.element), info.name.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::event::{ElementInfoEvent, ElementState};
    use crate::monitor::Monitor;
    use crate::registry::SubscriptionRegistry;
    use crate::transport::{ConnectionHandle, InProcessConnection};

    use super::*;

    fn info(element: ElementId, name: &str, state: ElementState) -> EventPayload {
        EventPayload::ElementInfo(ElementInfoEvent {
            element,
            name: name.to_string(),
            state,
        })
    }

    #[test]
    fn test_rename_is_delivered_once() {
        let conn = InProcessConnection::inline();
        let handle: ConnectionHandle = conn.clone();
        let registry = Arc::new(SubscriptionRegistry::new(handle));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let element = ElementId::new(9, 1);
        let monitor = Monitor::new(registry, "S", ElementNameMatcher::new(element));
        let sink = Arc::clone(&seen);
        monitor.start(move |e| sink.lock().push(e.value)).unwrap();

        conn.publish(info(element, "Encoder", ElementState::Active)).unwrap();
        // A state-only change carries the same name.
        conn.publish(info(element, "Encoder", ElementState::Paused)).unwrap();
        conn.publish(info(ElementId::new(9, 2), "Other", ElementState::Active)).unwrap();
        conn.publish(info(element, "Encoder B", ElementState::Paused)).unwrap();

        assert_eq!(*seen.lock(), vec!["Encoder".to_string(), "Encoder B".to_string()]);
    }
}
