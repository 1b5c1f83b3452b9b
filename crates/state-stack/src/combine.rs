//! Combining slice reducers into one root reducer
//!
//! Each slice reducer only ever sees its own slice. The root state is only
//! rebuilt when at least one slice comes back as a different `Arc`; otherwise
//! the previous root is returned as-is, so `Arc::ptr_eq` on the root or on any
//! slice is a valid change check.

use crate::action::{action_types, Action};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError, ROOT_SLICE};
use crate::middleware::logger::ShallowDiff;
use crate::reducer::Reducer;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Type-erased slice value.
pub type SliceState = Arc<dyn Any + Send + Sync>;

/// Reference identity of two shared values, ignoring pointer metadata.
pub(crate) fn same_ref<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Root state made of named, independently typed slices.
#[derive(Clone, Default)]
pub struct CombinedState {
    slices: BTreeMap<String, SliceState>,
}

impl CombinedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slice, typically to build a preloaded state.
    pub fn with_slice<T>(mut self, name: impl Into<String>, value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        self.slices.insert(name.into(), value);
        self
    }

    /// Typed access to a slice.
    pub fn slice<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.slices.get(name)?.clone().downcast::<T>().ok()
    }

    pub fn raw(&self, name: &str) -> Option<&SliceState> {
        self.slices.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl fmt::Debug for CombinedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.slices
                    .iter()
                    .map(|(name, value)| (name, Arc::as_ptr(value) as *const ())),
            )
            .finish()
    }
}

impl ShallowDiff for CombinedState {
    fn changed_keys(&self, next: &Self) -> Vec<String> {
        let mut changed: Vec<String> = next
            .slices
            .iter()
            .filter(|(name, value)| {
                self.slices
                    .get(name.as_str())
                    .is_none_or(|prev| !same_ref(prev, value))
            })
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            self.slices
                .keys()
                .filter(|name| !next.slices.contains_key(name.as_str()))
                .cloned(),
        );
        changed.sort();
        changed
    }
}

type ErasedReducer = Box<dyn Fn(Option<&SliceState>, &Action) -> Result<SliceState> + Send + Sync>;

struct SliceEntry {
    name: String,
    reduce: ErasedReducer,
}

/// Start combining slice reducers.
///
/// ```rust
/// # use state_stack::{combine_reducers, create_reducer, Action, Reducer};
/// # use std::sync::Arc;
/// let root = combine_reducers()
///     .slice("clicks", create_reducer(0_u32).case("clicks/add", |n, _| Arc::new(**n + 1)).build())
///     .slice("label", create_reducer(String::from("idle")).build())
///     .build()
///     .unwrap();
///
/// let state = root.reduce(None, &Action::new("clicks/add")).unwrap();
/// assert_eq!(*state.slice::<u32>("clicks").unwrap(), 1);
/// ```
pub fn combine_reducers() -> CombineReducers {
    CombineReducers {
        slices: Vec::new(),
        validate: true,
        warn_unexpected_keys: true,
    }
}

/// Builder returned by [`combine_reducers`].
pub struct CombineReducers {
    slices: Vec<SliceEntry>,
    validate: bool,
    warn_unexpected_keys: bool,
}

impl CombineReducers {
    /// Register the reducer for one slice.
    pub fn slice<T, R>(mut self, name: impl Into<String>, reducer: R) -> Self
    where
        T: Any + Send + Sync,
        R: Reducer<T> + 'static,
    {
        let name = name.into();
        let slice_name = name.clone();
        let reduce = move |prev: Option<&SliceState>, action: &Action| -> Result<SliceState> {
            let prev = match prev {
                Some(value) => Some(
                    Arc::clone(value)
                        .downcast::<T>()
                        .map_err(|_| StoreError::SliceTypeMismatch(slice_name.clone()))?,
                ),
                None => None,
            };
            let next = reducer
                .reduce(prev.as_ref(), action)
                .map_err(|e| label_slice(e, &slice_name))?;
            Ok(next as SliceState)
        };

        if self.slices.iter().any(|entry| entry.name == name) {
            log::warn!("Slice \"{}\" registered twice, keeping the last", name);
            self.slices.retain(|entry| entry.name != name);
        }
        self.slices.push(SliceEntry {
            name,
            reduce: Box::new(reduce),
        });
        self
    }

    /// Skip the construction-time check that every slice has an initial state.
    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn warn_unexpected_keys(mut self, warn: bool) -> Self {
        self.warn_unexpected_keys = warn;
        self
    }

    /// Apply the `[store]` table of a [`StackConfig`](crate::config::StackConfig).
    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        self.validate = config.validate_slices;
        self.warn_unexpected_keys = config.warn_unexpected_keys;
        self
    }

    /// Finish, validating the slices unless told otherwise.
    ///
    /// Every slice has to produce state for the init action and for an action
    /// type nobody handles.
    pub fn build(self) -> Result<CombinedReducer> {
        if self.validate {
            let checks = [
                Action::new(action_types::INIT),
                Action::new(action_types::UNKNOWN_ACTION),
            ];
            for entry in &self.slices {
                for check in &checks {
                    (entry.reduce)(None, check)?;
                }
            }
        }
        Ok(CombinedReducer {
            slices: self.slices,
            warn_unexpected_keys: self.warn_unexpected_keys,
        })
    }
}

fn label_slice(err: StoreError, slice: &str) -> StoreError {
    match err {
        StoreError::UndefinedReducerOutput {
            slice: inner,
            action_type,
        } => StoreError::UndefinedReducerOutput {
            slice: if inner == ROOT_SLICE {
                slice.to_string()
            } else {
                format!("{}.{}", slice, inner)
            },
            action_type,
        },
        other => other,
    }
}

/// Root reducer produced by [`CombineReducers::build`].
pub struct CombinedReducer {
    slices: Vec<SliceEntry>,
    warn_unexpected_keys: bool,
}

impl CombinedReducer {
    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|entry| entry.name.as_str())
    }

    fn report_unexpected_keys(&self, state: &CombinedState, action: &Action) {
        let unexpected: Vec<&str> = state
            .keys()
            .filter(|key| !self.slices.iter().any(|entry| entry.name == *key))
            .collect();
        if !unexpected.is_empty() {
            log::warn!(
                "Dropping unexpected keys {:?} from state during \"{}\"; expected one of {:?}",
                unexpected,
                action.kind,
                self.slice_names().collect::<Vec<_>>()
            );
        }
    }
}

impl Reducer<CombinedState> for CombinedReducer {
    fn reduce(&self, state: Option<&Arc<CombinedState>>, action: &Action) -> Result<Arc<CombinedState>> {
        if let Some(state) = state {
            if self.warn_unexpected_keys
                && (action.kind == action_types::INIT || action.kind == action_types::REPLACE)
            {
                self.report_unexpected_keys(state, action);
            }
        }

        let mut changed = false;
        let mut next = BTreeMap::new();
        for entry in &self.slices {
            let prev = state.and_then(|s| s.slices.get(&entry.name));
            let reduced = (entry.reduce)(prev, action)?;
            changed |= prev.is_none_or(|prev| !same_ref(prev, &reduced));
            next.insert(entry.name.clone(), reduced);
        }

        match state {
            Some(state) if !changed && state.slices.len() == next.len() => Ok(Arc::clone(state)),
            _ => Ok(Arc::new(CombinedState { slices: next })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::create_reducer;
    use pretty_assertions::assert_eq;

    fn root() -> CombinedReducer {
        combine_reducers()
            .slice(
                "a",
                create_reducer(0_u32).case("a/bump", |n, _| Arc::new(**n + 1)).build(),
            )
            .slice(
                "b",
                create_reducer(Vec::<String>::new())
                    .case("b/push", |items, action| {
                        let mut next = (**items).clone();
                        next.push(action.payload.to_string());
                        Arc::new(next)
                    })
                    .build(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_untouched_slices_keep_their_reference() {
        let reducer = root();
        let state = reducer.reduce(None, &Action::new(action_types::INIT)).unwrap();
        let next = reducer.reduce(Some(&state), &Action::new("a/bump")).unwrap();

        assert!(!Arc::ptr_eq(&state, &next));
        assert_eq!(*next.slice::<u32>("a").unwrap(), 1);
        assert!(same_ref(state.raw("b").unwrap(), next.raw("b").unwrap()));
    }

    #[test]
    fn test_unhandled_action_returns_same_root() {
        let reducer = root();
        let state = reducer.reduce(None, &Action::new(action_types::INIT)).unwrap();
        let next = reducer.reduce(Some(&state), &Action::new("c/unknown")).unwrap();
        assert!(Arc::ptr_eq(&state, &next));
    }

    #[test]
    fn test_undefined_slice_output_names_slice_and_action() {
        let reducer = combine_reducers()
            .slice("ok", create_reducer(1_u8).build())
            .slice(
                "broken",
                |state: Option<&Arc<u8>>, action: &Action| -> Option<Arc<u8>> {
                    if action.kind == "broken/explode" {
                        None
                    } else {
                        Some(state.cloned().unwrap_or_else(|| Arc::new(0)))
                    }
                },
            )
            .build()
            .unwrap();

        let state = reducer.reduce(None, &Action::new(action_types::INIT)).unwrap();
        let err = reducer
            .reduce(Some(&state), &Action::new("broken/explode"))
            .unwrap_err();
        match err {
            StoreError::UndefinedReducerOutput { slice, action_type } => {
                assert_eq!(slice, "broken");
                assert_eq!(action_type, "broken/explode");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validation_rejects_slice_without_initial_state() {
        let result = combine_reducers()
            .slice("lazy", |state: Option<&Arc<u8>>, _: &Action| state.cloned())
            .build();
        assert!(matches!(
            result,
            Err(StoreError::UndefinedReducerOutput { ref slice, .. }) if slice == "lazy"
        ));
    }

    #[test]
    fn test_config_can_disable_validation() {
        let config = StoreConfig {
            validate_slices: false,
            warn_unexpected_keys: false,
        };
        let result = combine_reducers()
            .with_config(&config)
            .slice("lazy", |state: Option<&Arc<u8>>, _: &Action| state.cloned())
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_preloaded_slice_of_wrong_type() {
        let reducer = root();
        let preloaded = Arc::new(CombinedState::new().with_slice("a", Arc::new("nope")));
        let err = reducer
            .reduce(Some(&preloaded), &Action::new(action_types::INIT))
            .unwrap_err();
        assert!(matches!(err, StoreError::SliceTypeMismatch(ref name) if name == "a"));
    }

    #[test]
    fn test_unexpected_keys_are_dropped() {
        let reducer = root();
        let preloaded = Arc::new(
            CombinedState::new()
                .with_slice("a", Arc::new(5_u32))
                .with_slice("stale", Arc::new(true)),
        );
        let state = reducer
            .reduce(Some(&preloaded), &Action::new(action_types::INIT))
            .unwrap();

        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(*state.slice::<u32>("a").unwrap(), 5);
    }

    #[test]
    fn test_nested_combine_labels_path() {
        let inner = combine_reducers()
            .slice(
                "deep",
                |state: Option<&Arc<u8>>, action: &Action| -> Option<Arc<u8>> {
                    (action.kind != "deep/fail").then(|| state.cloned().unwrap_or_else(|| Arc::new(0)))
                },
            )
            .build()
            .unwrap();
        let outer = combine_reducers().slice("outer", inner).build().unwrap();

        let state = outer.reduce(None, &Action::new(action_types::INIT)).unwrap();
        let err = outer.reduce(Some(&state), &Action::new("deep/fail")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UndefinedReducerOutput { ref slice, .. } if slice == "outer.deep"
        ));
    }

    #[test]
    fn test_changed_keys() {
        let reducer = root();
        let state = reducer.reduce(None, &Action::new(action_types::INIT)).unwrap();
        let next = reducer
            .reduce(Some(&state), &Action::with_payload("b/push", "x"))
            .unwrap();
        assert_eq!(state.changed_keys(&next), vec!["b".to_string()]);
        assert!(state.changed_keys(&state).is_empty());
    }
}
