use crate::error::MatchError;
use crate::event::{ElementState, EventPayload, EventType, SubscriptionFilter};
use crate::identity::{ElementId, ResourceRef};
use crate::registry::CachedValue;

use super::matcher::{ChangeMatcher, DedupGate, Matched};

/// Watches the lifecycle state of one element, or of every element.
///
/// An element reported active before its startup completed is not
/// delivered; the completed activation follows as its own event.
#[derive(Debug, Clone)]
pub struct ElementStateMatcher {
    element: ElementId,
}

impl ElementStateMatcher {
    /// Watches `element`; [`ElementId::WILDCARD`] watches all elements.
    #[must_use]
    pub const fn new(element: ElementId) -> Self {
        Self { element }
    }
}

impl ChangeMatcher for ElementStateMatcher {
    type Change = ElementState;

    fn role_suffix(&self) -> &'static str {
        "-State"
    }

    fn selection(&self) -> String {
        self.element.to_string()
    }

    fn destination(&self) -> Option<ElementId> {
        (!self.element.is_wildcard()).then_some(self.element)
    }

    fn filters(&self) -> Vec<SubscriptionFilter> {
        vec![SubscriptionFilter::element(EventType::ElementState, self.element)]
    }

    fn evaluate(
        &self,
        payload: &EventPayload,
        gate: &DedupGate<'_>,
    ) -> Result<Option<Matched<ElementState>>, MatchError> {
        let EventPayload::ElementState(event) = payload else {
            return Ok(None);
        };
        if !self.element.is_wildcard() && event.element != self.element {
            return Ok(None);
        }
        if event.state == ElementState::Active && !event.startup_complete {
            return Ok(None);
        }

        let key = event.element.to_string();
        if !gate.replace_if_different(&key, CachedValue::State(event.state)) {
            return Ok(None);
        }
        Ok(Some(Matched::new(ResourceRef::Element(event.element), event.state)))
    }
}
