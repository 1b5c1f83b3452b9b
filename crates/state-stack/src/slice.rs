//! Slice builder
//!
//! A slice is a named piece of state with its own case reducers. Building one
//! derives the action types (`"<name>/<verb>"`) and an [`ActionCreator`] per
//! case, all of which can be listed and inspected after the fact.

use crate::action::Action;
use crate::error::{Result, StoreError};
use crate::reducer::{create_reducer, CaseReducer, HandlerReducer, ReducerBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Creates actions of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCreator {
    kind: String,
}

impl ActionCreator {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// An action without payload.
    pub fn empty(&self) -> Action {
        Action::new(self.kind.clone())
    }

    pub fn create(&self, payload: impl Serialize) -> Result<Action> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| StoreError::InvalidAction(format!("payload of \"{}\": {}", self.kind, e)))?;
        Ok(Action::with_payload(self.kind.clone(), payload))
    }

    pub fn matches(&self, action: &Action) -> bool {
        action.kind == self.kind
    }
}

enum Case<S> {
    Own(String, CaseReducer<S>),
    Foreign(String, CaseReducer<S>),
}

/// Builder for a [`Slice`].
pub struct SliceBuilder<S> {
    name: String,
    initial: S,
    cases: Vec<Case<S>>,
}

impl<S> SliceBuilder<S>
where
    S: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, initial_state: S) -> Self {
        Self {
            name: name.into(),
            initial: initial_state,
            cases: Vec::new(),
        }
    }

    /// Add a case reducer; its action type becomes `"<name>/<verb>"`.
    pub fn case<F>(mut self, verb: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<S>, &Action) -> Arc<S> + Send + Sync + 'static,
    {
        self.cases.push(Case::Own(verb.into(), Arc::new(handler)));
        self
    }

    /// Add a case reducer that receives the decoded payload.
    ///
    /// A payload that does not decode leaves the state untouched.
    pub fn case_with_payload<P, F>(self, verb: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(&Arc<S>, P) -> Arc<S> + Send + Sync + 'static,
    {
        self.case(verb, move |state, action| match action.payload_as::<P>() {
            Ok(payload) => handler(state, payload),
            Err(e) => {
                log::warn!("Ignoring action: {}", e);
                Arc::clone(state)
            }
        })
    }

    /// React to an action type owned by someone else (no creator is derived).
    pub fn extra_case<F>(mut self, action_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<S>, &Action) -> Arc<S> + Send + Sync + 'static,
    {
        self.cases.push(Case::Foreign(action_type.into(), Arc::new(handler)));
        self
    }

    pub fn build(self) -> Slice<S> {
        let mut creators = BTreeMap::new();
        let mut builder: ReducerBuilder<S> = create_reducer(self.initial);

        for case in self.cases {
            match case {
                Case::Own(verb, handler) => {
                    let kind = format!("{}/{}", self.name, verb);
                    creators.insert(verb, ActionCreator::new(kind.clone()));
                    builder = builder.case_arc(kind, handler);
                }
                Case::Foreign(kind, handler) => {
                    builder = builder.case_arc(kind, handler);
                }
            }
        }

        Slice {
            name: self.name,
            actions: creators,
            reducer: builder.build(),
        }
    }
}

/// A built slice: name, derived action creators and reducer.
pub struct Slice<S> {
    name: String,
    actions: BTreeMap<String, ActionCreator>,
    reducer: HandlerReducer<S>,
}

impl<S> Slice<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derived creators keyed by verb.
    pub fn actions(&self) -> &BTreeMap<String, ActionCreator> {
        &self.actions
    }

    pub fn action(&self, verb: &str) -> Option<&ActionCreator> {
        self.actions.get(verb)
    }

    /// The derived action type for a verb.
    pub fn action_type(&self, verb: &str) -> Option<&str> {
        self.actions.get(verb).map(ActionCreator::kind)
    }

    /// The slice's reducer; clones share their handlers.
    pub fn reducer(&self) -> HandlerReducer<S> {
        self.reducer.clone()
    }

    pub fn initial_state(&self) -> Arc<S> {
        self.reducer.initial_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::Reducer;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Settings {
        volume: u8,
        muted: bool,
    }

    fn settings_slice() -> Slice<Settings> {
        SliceBuilder::new("settings", Settings::default())
            .case_with_payload("setVolume", |s: &Arc<Settings>, volume: u8| {
                Arc::new(Settings {
                    volume,
                    ..(**s).clone()
                })
            })
            .case("toggleMute", |s, _| {
                Arc::new(Settings {
                    muted: !s.muted,
                    ..(**s).clone()
                })
            })
            .extra_case("@@state_stack/RESET", |_, _| Arc::new(Settings::default()))
            .build()
    }

    #[test]
    fn test_derives_action_types() {
        let slice = settings_slice();
        assert_eq!(slice.name(), "settings");
        assert_eq!(slice.action_type("setVolume"), Some("settings/setVolume"));
        assert_eq!(slice.action_type("toggleMute"), Some("settings/toggleMute"));
        assert_eq!(
            slice.actions().keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["setVolume", "toggleMute"]
        );
        assert!(slice.action("@@state_stack/RESET").is_none());
    }

    #[test]
    fn test_creators_drive_the_reducer() {
        let slice = settings_slice();
        let reducer = slice.reducer();

        let set_volume = slice.action("setVolume").unwrap().create(7_u8).unwrap();
        let state = reducer.reduce(None, &set_volume).unwrap();
        assert_eq!(state.volume, 7);

        let toggle = slice.action("toggleMute").unwrap().empty();
        let state = reducer.reduce(Some(&state), &toggle).unwrap();
        assert!(state.muted);

        let state = reducer
            .reduce(Some(&state), &Action::new("@@state_stack/RESET"))
            .unwrap();
        assert_eq!(*state, Settings::default());
    }
}
