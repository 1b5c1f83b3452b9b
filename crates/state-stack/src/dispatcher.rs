//! Dispatch and state-reader handles
//!
//! Middleware, thunks and the store itself all dispatch through a
//! [`Dispatcher`]: a cloneable handle around one step of the dispatch chain.
//! Dispatching through it enters the chain from that step onwards.

use crate::action::{Dispatchable, Dispatched};
use crate::error::Result;
use std::sync::{Arc, Weak};

pub(crate) type DispatchFn<S> = dyn Fn(Dispatchable<S>) -> Result<Dispatched> + Send + Sync;
type GetStateFn<S> = dyn Fn() -> Result<Arc<S>> + Send + Sync;

/// Handle for sending actions or thunks into a dispatch chain.
pub struct Dispatcher<S> {
    dispatch: Arc<DispatchFn<S>>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            dispatch: Arc::clone(&self.dispatch),
        }
    }
}

impl<S> Dispatcher<S> {
    pub fn new<F>(dispatch: F) -> Self
    where
        F: Fn(Dispatchable<S>) -> Result<Dispatched> + Send + Sync + 'static,
    {
        Self {
            dispatch: Arc::new(dispatch),
        }
    }

    /// Dispatch an action or thunk.
    pub fn dispatch(&self, dispatchable: impl Into<Dispatchable<S>>) -> Result<Dispatched> {
        (self.dispatch)(dispatchable.into())
    }

    pub(crate) fn downgrade(&self) -> Weak<DispatchFn<S>> {
        Arc::downgrade(&self.dispatch)
    }
}

/// Handle for reading the current state.
pub struct GetState<S> {
    get: Arc<GetStateFn<S>>,
}

impl<S> Clone for GetState<S> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
        }
    }
}

impl<S> GetState<S> {
    pub fn new<F>(get: F) -> Self
    where
        F: Fn() -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Self { get: Arc::new(get) }
    }

    pub fn get(&self) -> Result<Arc<S>> {
        (self.get)()
    }
}
