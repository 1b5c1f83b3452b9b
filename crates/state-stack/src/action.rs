//! Actions, thunks and dispatch results
//!
//! `Action` is the plain record that crosses the serialization boundary: a
//! required `type`, an optional `payload` and any number of out-of-band fields
//! (`meta`, `error`, `api`, `actions`, `batch`, ...) that only specific
//! middleware look at. Inside the program, slices usually work with closed
//! enums instead and convert through [`TypedAction`].

use crate::dispatcher::{Dispatcher, GetState};
use crate::error::{Result, StoreError};
use crate::middleware::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;

/// Action types reserved for the store's own bookkeeping.
pub mod action_types {
    /// Prefix shared by every internal action type.
    pub const PREFIX: &str = "@@state_stack/";
    /// Dispatched once when a store is created.
    pub const INIT: &str = "@@state_stack/INIT";
    /// Dispatched after `replace_reducer`.
    pub const REPLACE: &str = "@@state_stack/REPLACE";
    /// Used by the slice validation pass; no reducer should recognise it.
    pub const UNKNOWN_ACTION: &str = "@@state_stack/UNKNOWN_ACTION";
    /// Type of the wrapper built by [`Action::batch`](super::Action::batch).
    pub const BATCH: &str = "@@state_stack/BATCH";
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A plain action record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Identifies the intent, conventionally `"<slice>/<verb>"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
    /// Out-of-band fields consumed by middleware (`api`, `actions`, `batch`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
            meta: None,
            error: false,
            extra: Map::new(),
        }
    }

    pub fn with_payload(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::new(kind)
        }
    }

    pub fn meta(mut self, meta: impl Into<Value>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// Mark the action as describing a failure.
    pub fn failed(mut self) -> Self {
        self.error = true;
        self
    }

    /// Attach an out-of-band field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Build an action from an externally constructed JSON record.
    pub fn from_value(value: Value) -> Result<Self> {
        let Some(record) = value.as_object() else {
            return Err(StoreError::InvalidAction(format!(
                "expected a record, got {}",
                value_kind(&value)
            )));
        };
        match record.get("type") {
            Some(Value::String(kind)) if !kind.trim().is_empty() => {}
            Some(Value::String(_)) => {
                return Err(StoreError::InvalidAction("\"type\" is blank".to_string()));
            }
            Some(other) => {
                return Err(StoreError::InvalidAction(format!(
                    "\"type\" must be a string, got {}",
                    value_kind(other)
                )));
            }
            None => {
                return Err(StoreError::InvalidAction(
                    "record has no \"type\" field".to_string(),
                ));
            }
        }
        serde_json::from_value(value).map_err(|e| StoreError::InvalidAction(e.to_string()))
    }

    /// Check the invariants the store relies on.
    pub fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(StoreError::InvalidAction(
                "action has an empty \"type\"".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether this is one of the store's own bookkeeping actions.
    pub fn is_internal(&self) -> bool {
        self.kind.starts_with(action_types::PREFIX)
    }

    /// Decode the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            StoreError::InvalidAction(format!("payload of \"{}\": {}", self.kind, e))
        })
    }

    /// Wrap several actions so the batch middleware dispatches them in order.
    pub fn batch(actions: Vec<Action>) -> Self {
        let actions: Vec<Value> = actions
            .into_iter()
            .map(|action| serde_json::to_value(action).unwrap_or(Value::Null))
            .collect();
        Self::new(action_types::BATCH)
            .field("batch", true)
            .field("actions", actions)
    }

    /// The nested actions when this action is a batch wrapper.
    ///
    /// Returns `None` unless both the `batch` flag and an `actions` sequence
    /// are present.
    pub fn batched_actions(&self) -> Option<Result<Vec<Action>>> {
        if self.extra.get("batch").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        let nested = self.extra.get("actions")?.as_array()?;
        Some(nested.iter().cloned().map(Action::from_value).collect())
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a record",
    }
}

/// Conversion between closed action enums and the plain [`Action`] record.
///
/// Any serde type works when it is tagged the way actions are serialized:
///
/// ```rust
/// # use serde::{Deserialize, Serialize};
/// #[derive(Serialize, Deserialize)]
/// #[serde(tag = "type", content = "payload")]
/// enum PlayerAction {
///     #[serde(rename = "player/addXP")]
///     AddXp(u64),
/// }
/// ```
pub trait TypedAction: Sized {
    /// Decode the action, or `None` when it belongs to someone else.
    fn from_action(action: &Action) -> Option<Self>;

    fn to_action(&self) -> Result<Action>;
}

impl<T> TypedAction for T
where
    T: Serialize + DeserializeOwned,
{
    fn from_action(action: &Action) -> Option<Self> {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::String(action.kind.clone()));
        if !action.payload.is_null() {
            record.insert("payload".to_string(), action.payload.clone());
        }
        serde_json::from_value(Value::Object(record)).ok()
    }

    fn to_action(&self) -> Result<Action> {
        let value = serde_json::to_value(self)
            .map_err(|e| StoreError::InvalidAction(e.to_string()))?;
        Action::from_value(value)
    }
}

/// A deferred unit of work dispatched in place of an action.
///
/// The thunk middleware calls it with the full dispatch chain and a state
/// reader instead of forwarding it to the reducer.
pub struct Thunk<S> {
    label: String,
    body: Box<dyn FnOnce(Dispatcher<S>, GetState<S>) -> Result<Dispatched> + Send>,
}

impl<S: 'static> Thunk<S> {
    pub fn new<F>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Dispatcher<S>, GetState<S>) -> Result<Dispatched> + Send + 'static,
    {
        Self {
            label: label.into(),
            body: Box::new(body),
        }
    }

    /// Build a thunk whose work continues asynchronously.
    ///
    /// The returned future is handed back to the caller of `dispatch` as
    /// [`Dispatched::Pending`]; its error becomes the caller's error.
    pub fn from_async<F, Fut>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Dispatcher<S>, GetState<S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(label, move |dispatch, get_state| {
            Ok(Dispatched::Pending(Box::pin(body(dispatch, get_state))))
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn run(self, dispatch: Dispatcher<S>, get_state: GetState<S>) -> Result<Dispatched> {
        (self.body)(dispatch, get_state)
    }
}

impl<S> fmt::Debug for Thunk<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk").field("label", &self.label).finish()
    }
}

/// Anything that can be handed to `dispatch`.
#[derive(Debug)]
pub enum Dispatchable<S> {
    Action(Action),
    Thunk(Thunk<S>),
}

impl<S> Dispatchable<S> {
    /// The action type, or the thunk label, for diagnostics.
    pub fn describe(&self) -> &str {
        match self {
            Dispatchable::Action(action) => &action.kind,
            Dispatchable::Thunk(thunk) => &thunk.label,
        }
    }
}

impl<S> From<Action> for Dispatchable<S> {
    fn from(action: Action) -> Self {
        Dispatchable::Action(action)
    }
}

impl<S> From<Thunk<S>> for Dispatchable<S> {
    fn from(thunk: Thunk<S>) -> Self {
        Dispatchable::Thunk(thunk)
    }
}

/// What `dispatch` hands back.
#[must_use = "a pending result does nothing until it is awaited"]
pub enum Dispatched {
    /// The dispatched action, unchanged.
    Action(Action),
    /// The synchronous result of a thunk.
    Value(Value),
    /// Asynchronous work started by a thunk or the API middleware.
    Pending(BoxFuture<'static, Result<Value>>),
}

impl Dispatched {
    pub fn action(&self) -> Option<&Action> {
        match self {
            Dispatched::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn into_action(self) -> Option<Action> {
        match self {
            Dispatched::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Dispatched::Pending(_))
    }

    /// Wait for the outcome, turning an action into its JSON form.
    pub async fn resolve(self) -> Result<Value> {
        match self {
            Dispatched::Action(action) => serde_json::to_value(action).map_err(StoreError::effect),
            Dispatched::Value(value) => Ok(value),
            Dispatched::Pending(pending) => pending.await,
        }
    }
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatched::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Dispatched::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Dispatched::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload")]
    enum PlayerAction {
        #[serde(rename = "player/addXP")]
        AddXp(u64),
        #[serde(rename = "player/reset")]
        Reset,
    }

    #[test]
    fn test_from_value_accepts_external_records() {
        let action = Action::from_value(json!({
            "type": "storage/loadAll",
            "payload": { "quests": [] },
            "source": "localStorage"
        }))
        .unwrap();

        assert_eq!(action.kind, "storage/loadAll");
        assert_eq!(action.payload, json!({ "quests": [] }));
        assert_eq!(action.get_field("source"), Some(&json!("localStorage")));
    }

    #[test]
    fn test_from_value_rejects_non_records() {
        assert!(matches!(
            Action::from_value(json!("player/addXP")),
            Err(StoreError::InvalidAction(_))
        ));
        assert!(matches!(
            Action::from_value(json!({ "payload": 1 })),
            Err(StoreError::InvalidAction(_))
        ));
        assert!(matches!(
            Action::from_value(json!({ "type": 7 })),
            Err(StoreError::InvalidAction(_))
        ));
        assert!(matches!(
            Action::from_value(json!({ "type": "" })),
            Err(StoreError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_from_value_agrees_with_validate_on_blank_type() {
        assert!(Action::new("   ").validate().is_err());
        assert!(matches!(
            Action::from_value(json!({ "type": "   " })),
            Err(StoreError::InvalidAction(_))
        ));
        assert!(matches!(
            Action::from_value(json!({ "type": "\t\n" })),
            Err(StoreError::InvalidAction(_))
        ));
        let padded = Action::from_value(json!({ "type": " player/addXP " })).unwrap();
        assert!(padded.validate().is_ok());
    }

    #[test]
    fn test_batch_wrapper_round_trips_nested_actions() {
        let batch = Action::batch(vec![
            Action::with_payload("player/addXP", 10),
            Action::new("player/reset"),
        ]);

        let nested = batch.batched_actions().unwrap().unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].kind, "player/addXP");
        assert_eq!(nested[1].kind, "player/reset");
        assert!(batch.is_internal());
    }

    #[test]
    fn test_batched_actions_requires_flag() {
        let action = Action::new("quests/many").field("actions", json!([]));
        assert!(action.batched_actions().is_none());
    }

    #[test]
    fn test_typed_action_bridge() {
        let action = PlayerAction::AddXp(150).to_action().unwrap();
        assert_eq!(action.kind, "player/addXP");
        assert_eq!(action.payload, json!(150));

        assert_eq!(
            PlayerAction::from_action(&action),
            Some(PlayerAction::AddXp(150))
        );
        assert_eq!(
            PlayerAction::from_action(&Action::new("player/reset")),
            Some(PlayerAction::Reset)
        );
        assert_eq!(PlayerAction::from_action(&Action::new("quests/add")), None);
    }
}
