//! Cleanup records.
//!
//! A cleanup record observes lifecycle-state events of one element and tears
//! down other records when that element goes away:
//! - the source cleanup watches the owning element and removes the whole
//!   scope when it stops or is deleted;
//! - a destination cleanup watches an element referenced by a subscription
//!   and removes every record targeting it when it is deleted.
//!
//! Both are created without overwrite, so monitors sharing a scope or a
//! destination share one cleanup record. Teardown is idempotent: a repeated
//! deletion event finds nothing left to remove.

use std::sync::{Arc, Weak};

use crate::error::MonitorResult;
use crate::event::{ElementState, EventPayload, EventType, SubscriptionFilter, SubscriptionSetId};
use crate::identity::ElementId;
use crate::registry::{RecordKind, SubscriptionRecord, SubscriptionRegistry};
use crate::transport::EventHandler;

/// Id of the source cleanup record of a scope.
#[must_use]
pub fn source_cleanup_id(source_id: &str) -> String {
    format!("{source_id}-SourceCleanup")
}

/// Id of the destination cleanup record for `destination` in a scope.
#[must_use]
pub fn destination_cleanup_id(source_id: &str, destination: ElementId) -> String {
    format!("{source_id}-{destination}-DestinationCleanup")
}

/// Registers the cleanup record tearing the scope down when `owner` stops
/// or is deleted.
pub fn register_source_cleanup(
    registry: &Arc<SubscriptionRegistry>,
    source_id: &str,
    owner: ElementId,
) -> MonitorResult<()> {
    let set_id = SubscriptionSetId::new();
    let weak = Arc::downgrade(registry);
    let scope = source_id.to_string();

    let handler = EventHandler::new(move |_, event| {
        if event.set_id != set_id {
            return;
        }
        let Some(state) = lifecycle_state(&event.payload, owner) else {
            return;
        };
        if !state.is_stopped_or_deleted() {
            return;
        }
        on_registry(&weak, |registry| match registry.remove_all(&scope) {
            Ok(removed) => {
                tracing::info!(source_id = %scope, element = %owner, ?state, removed, "source gone, scope removed");
            }
            Err(e) => {
                tracing::error!(source_id = %scope, element = %owner, error = %e, "scope teardown failed");
            }
        });
    });

    let record = SubscriptionRecord::new(
        source_cleanup_id(source_id),
        RecordKind::Cleanup,
        None,
        vec![SubscriptionFilter::element(EventType::ElementState, owner)],
        handler,
    )
    .with_set_id(set_id);
    registry.create(source_id, record, false)?;
    Ok(())
}

/// Registers the cleanup record removing every record that targets
/// `destination` once it is deleted.
pub fn register_destination_cleanup(
    registry: &Arc<SubscriptionRegistry>,
    source_id: &str,
    destination: ElementId,
) -> MonitorResult<()> {
    let set_id = SubscriptionSetId::new();
    let weak = Arc::downgrade(registry);
    let scope = source_id.to_string();

    let handler = EventHandler::new(move |_, event| {
        if event.set_id != set_id {
            return;
        }
        if lifecycle_state(&event.payload, destination) != Some(ElementState::Deleted) {
            return;
        }
        on_registry(&weak, |registry| {
            match registry.remove_by_destination(&scope, destination) {
                Ok(removed) => {
                    tracing::info!(source_id = %scope, %destination, removed, "destination deleted, records removed");
                }
                Err(e) => {
                    tracing::error!(source_id = %scope, %destination, error = %e, "destination teardown failed");
                }
            }
        });
    });

    let record = SubscriptionRecord::new(
        destination_cleanup_id(source_id, destination),
        RecordKind::Cleanup,
        Some(destination),
        vec![SubscriptionFilter::element(EventType::ElementState, destination)],
        handler,
    )
    .with_set_id(set_id);
    registry.create(source_id, record, false)?;
    Ok(())
}

fn lifecycle_state(payload: &EventPayload, element: ElementId) -> Option<ElementState> {
    match payload {
        EventPayload::ElementState(e) if e.element == element => Some(e.state),
        _ => None,
    }
}

fn on_registry(weak: &Weak<SubscriptionRegistry>, f: impl FnOnce(&SubscriptionRegistry)) {
    if let Some(registry) = weak.upgrade() {
        f(&registry);
    }
}
