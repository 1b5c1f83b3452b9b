//! Predictable state container with unidirectional data flow
//!
//! This crate provides:
//! - A store that owns one state tree and runs every change through a reducer
//! - Reducer utilities (handler maps, slices, `combine_reducers`)
//! - An entity adapter for normalized collections
//! - A middleware pipeline with thunk, batch, logger and API middleware
//! - Memoized selectors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   dispatch    ┌────────────┐   next    ┌─────────┐
//! │  caller  │──────────────▶│ middleware │──────────▶│ reducer │
//! └──────────┘               └────────────┘           └─────────┘
//!      ▲                                                   │
//!      │          get_state / selectors                   ▼
//!      └──────────────────────────────────────────── state + listeners
//! ```
//!
//! # Example
//!
//! ```rust
//! use state_stack::{create_reducer, create_store, Action};
//! use std::sync::Arc;
//!
//! # fn main() -> state_stack::error::Result<()> {
//! let reducer = create_reducer(0_i64)
//!     .case("counter/add", |n, action| Arc::new(**n + action.payload.as_i64().unwrap_or(1)))
//!     .build();
//! let store = create_store(reducer, None, None)?;
//!
//! store.subscribe(|| log::debug!("counter changed"))?;
//! let _ = store.dispatch(Action::with_payload("counter/add", 5))?;
//! assert_eq!(*store.get_state()?, 5);
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod combine;
pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod reducer;
pub mod selector;
pub mod slice;
pub mod store;

pub use action::{action_types, Action, Dispatchable, Dispatched, Thunk, TypedAction};
pub use combine::{combine_reducers, CombineReducers, CombinedReducer, CombinedState};
pub use config::{ApiConfig, LoggerConfig, StackConfig, StoreConfig};
pub use dispatcher::{Dispatcher, GetState};
pub use entity::{EntityAdapter, EntityId, EntitySelectors, EntityState, Update};
pub use error::{Result, StoreError};
pub use middleware::{
    apply_middleware, compose_middleware, ApiCall, ApiClient, ApiMiddleware, BatchMiddleware,
    FnApiClient, LogEntry, LoggerMiddleware, Middleware, MiddlewareApi, ShallowDiff,
    ThunkMiddleware,
};
pub use reducer::{create_reducer, typed_reducer, BoxedReducer, HandlerReducer, Reducer};
pub use selector::{
    create_array_selector, create_entities_selector, create_filter_selector,
    create_object_selector, create_selector, create_slice_selector, MemoizedSelector, RefEq,
    Selector,
};
pub use slice::{ActionCreator, Slice, SliceBuilder};
pub use store::{create_store, Store, Subscription};
