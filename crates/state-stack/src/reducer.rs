//! Reducer utilities
//!
//! A reducer is a pure function from the previous state and an action to the
//! next state. State travels as `Arc<S>`: returning the incoming `Arc`
//! unchanged means "nothing happened", which lets consumers detect changes
//! with [`Arc::ptr_eq`] instead of comparing values.

use crate::action::{Action, TypedAction};
use crate::error::{Result, StoreError, ROOT_SLICE};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Computes the next state for an action.
///
/// `state` is `None` the first time a reducer runs, in which case it must
/// produce its initial state. Unrecognised action types must return the
/// incoming state untouched.
pub trait Reducer<S>: Send + Sync {
    fn reduce(&self, state: Option<&Arc<S>>, action: &Action) -> Result<Arc<S>>;
}

/// Closures are reducers; returning `None` means the reducer produced no state.
impl<S, F> Reducer<S> for F
where
    F: Fn(Option<&Arc<S>>, &Action) -> Option<Arc<S>> + Send + Sync,
{
    fn reduce(&self, state: Option<&Arc<S>>, action: &Action) -> Result<Arc<S>> {
        self(state, action).ok_or_else(|| StoreError::UndefinedReducerOutput {
            slice: ROOT_SLICE.to_string(),
            action_type: action.kind.clone(),
        })
    }
}

/// Shared, type-erased reducer.
pub type BoxedReducer<S> = Arc<dyn Reducer<S>>;

/// Handler for one action type.
pub type CaseReducer<S> = Arc<dyn Fn(&Arc<S>, &Action) -> Arc<S> + Send + Sync>;

/// Start a reducer built from a map of action type to handler.
///
/// ```rust
/// # use state_stack::{create_reducer, Action, Reducer};
/// # use std::sync::Arc;
/// let counter = create_reducer(0_i64)
///     .case("counter/increment", |n, _| Arc::new(**n + 1))
///     .build();
///
/// let next = counter.reduce(None, &Action::new("counter/increment")).unwrap();
/// assert_eq!(*next, 1);
/// ```
pub fn create_reducer<S>(initial_state: S) -> ReducerBuilder<S>
where
    S: Send + Sync + 'static,
{
    ReducerBuilder {
        initial: Arc::new(initial_state),
        handlers: HashMap::new(),
    }
}

/// Builder returned by [`create_reducer`].
pub struct ReducerBuilder<S> {
    initial: Arc<S>,
    handlers: HashMap<String, CaseReducer<S>>,
}

impl<S> ReducerBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Handle one action type.
    pub fn case<F>(self, action_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<S>, &Action) -> Arc<S> + Send + Sync + 'static,
    {
        self.case_arc(action_type.into(), Arc::new(handler))
    }

    /// Handle one action type, decoding its payload first.
    ///
    /// A payload that does not decode leaves the state untouched.
    pub fn case_with_payload<P, F>(self, action_type: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(&Arc<S>, P) -> Arc<S> + Send + Sync + 'static,
    {
        self.case(action_type, move |state, action| match action.payload_as::<P>() {
            Ok(payload) => handler(state, payload),
            Err(e) => {
                log::warn!("Ignoring action: {}", e);
                Arc::clone(state)
            }
        })
    }

    pub(crate) fn case_arc(mut self, action_type: String, handler: CaseReducer<S>) -> Self {
        if self.handlers.insert(action_type.clone(), handler).is_some() {
            log::warn!("Handler for \"{}\" registered twice, keeping the last", action_type);
        }
        self
    }

    pub fn build(self) -> HandlerReducer<S> {
        HandlerReducer {
            initial: self.initial,
            handlers: self.handlers,
        }
    }
}

/// Reducer produced by [`ReducerBuilder::build`].
pub struct HandlerReducer<S> {
    initial: Arc<S>,
    handlers: HashMap<String, CaseReducer<S>>,
}

impl<S> Clone for HandlerReducer<S> {
    fn clone(&self) -> Self {
        Self {
            initial: Arc::clone(&self.initial),
            handlers: self.handlers.clone(),
        }
    }
}

impl<S> HandlerReducer<S> {
    pub fn initial_state(&self) -> Arc<S> {
        Arc::clone(&self.initial)
    }

    pub fn handles(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// Action types with a registered handler, sorted.
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl<S> Reducer<S> for HandlerReducer<S>
where
    S: Send + Sync,
{
    fn reduce(&self, state: Option<&Arc<S>>, action: &Action) -> Result<Arc<S>> {
        let state = state.unwrap_or(&self.initial);
        Ok(match self.handlers.get(&action.kind) {
            Some(handler) => handler(state, action),
            None => Arc::clone(state),
        })
    }
}

/// Reducer over a closed action enum.
///
/// Actions that do not decode into `A` leave the state untouched, so the
/// handler can match exhaustively on its own variants.
pub fn typed_reducer<S, A, F>(initial_state: S, handler: F) -> TypedReducer<S, A, F>
where
    A: TypedAction,
    F: Fn(&Arc<S>, A) -> Arc<S>,
{
    TypedReducer {
        initial: Arc::new(initial_state),
        handler,
        _action: PhantomData,
    }
}

pub struct TypedReducer<S, A, F> {
    initial: Arc<S>,
    handler: F,
    _action: PhantomData<fn(A)>,
}

impl<S, A, F> Reducer<S> for TypedReducer<S, A, F>
where
    S: Send + Sync,
    A: TypedAction,
    F: Fn(&Arc<S>, A) -> Arc<S> + Send + Sync,
{
    fn reduce(&self, state: Option<&Arc<S>>, action: &Action) -> Result<Arc<S>> {
        let state = state.unwrap_or(&self.initial);
        Ok(match A::from_action(action) {
            Some(typed) => (self.handler)(state, typed),
            None => Arc::clone(state),
        })
    }
}
