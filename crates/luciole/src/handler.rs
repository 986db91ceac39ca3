//! User action handlers
//!
//! A handler turns `(snapshot, action, data)` into a new snapshot. It
//! takes the snapshot by value and must return a fresh one rather than
//! aliasing the old (the page still owns the previous snapshot for
//! diffing). Handlers are plain synchronous calls; the page session
//! wraps them with timeout, cancellation, and panic containment.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Failure reported by an action handler. Never fatal to the page.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    /// Field-level issues, delivered via `meta.errors`
    Validation(BTreeMap<String, String>),
    /// The handler could not complete
    Failed(String),
}

impl ActionError {
    /// Single-field validation error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(BTreeMap::from([(field.into(), message.into())]))
    }

    pub(crate) fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            ActionError::Validation(fields) => fields.clone(),
            ActionError::Failed(msg) => BTreeMap::from([("error".to_string(), msg.clone())]),
        }
    }
}

/// User-supplied state transition for one page.
///
/// The cancellation token fires when the page is closing or the action
/// timed out; long-running handlers should poll it and bail out.
pub trait ActionHandler: Send + Sync + 'static {
    fn handle(
        &self,
        snapshot: Value,
        action: &str,
        data: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, ActionError>;
}

impl<F> ActionHandler for F
where
    F: Fn(Value, &str, &Map<String, Value>, &CancellationToken) -> Result<Value, ActionError>
        + Send
        + Sync
        + 'static,
{
    fn handle(
        &self,
        snapshot: Value,
        action: &str,
        data: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, ActionError> {
        self(snapshot, action, data, cancel)
    }
}
