//! Error types for monitorkit.
//!
//! All errors are strongly typed using thiserror. Callers of `start`/`stop`
//! only ever see contract violations and transport failures; match errors
//! are raised inside event handlers where they are logged and swallowed.

use thiserror::Error;

/// Contract violations: the caller asked for something that can never succeed.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Subscription '{record_id}' not found in scope '{source_id}'")]
    SubscriptionNotFound {
        source_id: String,
        record_id: String,
    },

    #[error("Invalid selection: {reason}")]
    InvalidSelection {
        reason: String,
    },

    #[error("Wildcard selection is not supported by {matcher}")]
    WildcardNotSupported {
        matcher: String,
    },
}

/// Failures reported by the shared transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Subscribe failed for set {set_id}: {message}")]
    SubscribeFailed {
        set_id: String,
        message: String,
    },

    #[error("Unsubscribe failed for set {set_id}: {message}")]
    UnsubscribeFailed {
        set_id: String,
        message: String,
    },

    #[error("Connection disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Errors raised while turning a raw event into a typed change.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    #[error("Cannot convert {actual} to {expected}")]
    Conversion {
        expected: &'static str,
        actual: String,
    },

    #[error("Event is missing field '{field}'")]
    MissingField {
        field: &'static str,
    },
}

/// Top-level error type for monitorkit.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl MonitorError {
    /// Returns true if this is a contract violation.
    #[must_use]
    pub const fn is_contract(&self) -> bool {
        matches!(self, Self::Contract(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this is a subscription-not-found contract violation.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Contract(ContractError::SubscriptionNotFound { .. }))
    }

    /// Returns true if retrying the failed operation may succeed.
    ///
    /// The registry never retries on its own; this only informs callers
    /// deciding whether to run `remove_all` again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Contract(_) => false,
            Self::Transport(e) => matches!(
                e,
                TransportError::Disconnected { .. } | TransportError::Timeout { .. }
            ),
        }
    }
}

/// Result type alias for monitorkit operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
