//! Middleware pipeline
//!
//! Middleware wraps the store's dispatch. Each one receives the action, a
//! facade onto the store ([`MiddlewareApi`]) and the next step of the chain,
//! and decides whether and how to pass the action on.
//!
//! ```text
//! dispatch → first middleware → ... → last middleware → reducer → listeners
//! ```
//!
//! The first middleware in the list is the outermost wrapper: it sees the
//! action first on the way in and the result last on the way out.
//!
//! ## Example
//!
//! ```rust
//! # use state_stack::{Action, Dispatchable, Dispatcher, MiddlewareApi};
//! # use state_stack::error::Result;
//! # use state_stack::Dispatched;
//! fn tag(api: &MiddlewareApi<u32>, next: &Dispatcher<u32>, action: Dispatchable<u32>) -> Result<Dispatched> {
//!     log::debug!("before {}", action.describe());
//!     let result = next.dispatch(action);
//!     log::debug!("after, state = {:?}", api.get_state().ok());
//!     result
//! }
//! ```

use crate::action::{Dispatchable, Dispatched};
use crate::dispatcher::{DispatchFn, Dispatcher, GetState};
use crate::error::{Result, StoreError};
use crate::store::{Enhancer, StoreCreator};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};

pub mod api;
pub mod batch;
pub mod logger;
pub mod thunk;

pub use api::{ApiCall, ApiClient, ApiMiddleware, FnApiClient};
pub use batch::BatchMiddleware;
pub use logger::{LogEntry, LoggerMiddleware, ShallowDiff};
pub use thunk::ThunkMiddleware;

/// BoxFuture type alias for asynchronous dispatch results
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Store facade handed to middleware.
///
/// `dispatch` goes through the whole chain again. It is only bound once the
/// chain is complete; dispatching earlier fails with
/// [`StoreError::PrematureDispatch`].
pub struct MiddlewareApi<S> {
    get_state: GetState<S>,
    dispatch: Arc<OnceLock<Weak<DispatchFn<S>>>>,
}

impl<S> Clone for MiddlewareApi<S> {
    fn clone(&self) -> Self {
        Self {
            get_state: self.get_state.clone(),
            dispatch: Arc::clone(&self.dispatch),
        }
    }
}

impl<S: 'static> MiddlewareApi<S> {
    pub fn get_state(&self) -> Result<Arc<S>> {
        self.get_state.get()
    }

    /// Dispatch from the top of the chain.
    pub fn dispatch(&self, dispatchable: impl Into<Dispatchable<S>>) -> Result<Dispatched> {
        let chain = self.dispatch.get().ok_or(StoreError::PrematureDispatch)?;
        let chain = chain.upgrade().ok_or(StoreError::StoreDropped)?;
        chain(dispatchable.into())
    }

    /// A detached handle onto [`dispatch`](Self::dispatch), e.g. for thunks.
    pub fn dispatcher(&self) -> Dispatcher<S> {
        let api = self.clone();
        Dispatcher::new(move |dispatchable| api.dispatch(dispatchable))
    }

    pub fn state_reader(&self) -> GetState<S> {
        self.get_state.clone()
    }
}

/// Middleware trait - wraps the next step of the dispatch chain
pub trait Middleware<S>: Send + Sync {
    /// Called once while the chain is being built, before `dispatch` is bound.
    fn attach(&self, _api: &MiddlewareApi<S>) -> Result<()> {
        Ok(())
    }

    /// Handle an action
    ///
    /// - `api`: Store facade (state reader, dispatch from the top of the chain)
    /// - `next`: The rest of the chain, ending in the reducer
    /// - `action`: The action or thunk being dispatched
    ///
    /// Call `next.dispatch(action)` to pass it on; return without calling it to
    /// consume the action.
    fn handle(
        &self,
        api: &MiddlewareApi<S>,
        next: &Dispatcher<S>,
        action: Dispatchable<S>,
    ) -> Result<Dispatched>;
}

impl<S, F> Middleware<S> for F
where
    F: Fn(&MiddlewareApi<S>, &Dispatcher<S>, Dispatchable<S>) -> Result<Dispatched> + Send + Sync,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S>,
        next: &Dispatcher<S>,
        action: Dispatchable<S>,
    ) -> Result<Dispatched> {
        self(api, next, action)
    }
}

/// A single-use `T -> T` transformation.
pub type Compose<T> = Box<dyn FnOnce(T) -> T>;

/// Compose right to left: `[a, b, c]` becomes `x -> a(b(c(x)))`.
///
/// No functions yields the identity; one function yields itself.
pub fn compose_middleware<T: 'static>(mut fns: Vec<Compose<T>>) -> Compose<T> {
    match fns.len() {
        0 => Box::new(|x| x),
        1 => fns.remove(0),
        _ => fns
            .into_iter()
            .rev()
            .reduce(|inner, outer| Box::new(move |x| outer(inner(x))) as Compose<T>)
            .unwrap_or_else(|| Box::new(|x| x)),
    }
}

/// Enhancer installing `middlewares` around the store's dispatch.
///
/// ```rust
/// # use state_stack::{apply_middleware, create_reducer, create_store, Action, ThunkMiddleware, BatchMiddleware, Middleware};
/// # use std::sync::Arc;
/// let reducer = create_reducer(0_u32).case("clicks/add", |n, _| Arc::new(**n + 1)).build();
/// let middlewares: Vec<Arc<dyn Middleware<u32>>> =
///     vec![Arc::new(ThunkMiddleware), Arc::new(BatchMiddleware)];
/// let store = create_store(reducer, None, Some(apply_middleware(middlewares))).unwrap();
///
/// let _ = store
///     .dispatch(Action::batch(vec![Action::new("clicks/add"), Action::new("clicks/add")]))
///     .unwrap();
/// assert_eq!(*store.get_state().unwrap(), 2);
/// ```
pub fn apply_middleware<S>(middlewares: Vec<Arc<dyn Middleware<S>>>) -> Enhancer<S>
where
    S: Send + Sync + 'static,
{
    Box::new(move |create: StoreCreator<S>| -> StoreCreator<S> {
        Box::new(move |reducer, preloaded_state| {
            let store = create(reducer, preloaded_state)?;

            let slot: Arc<OnceLock<Weak<DispatchFn<S>>>> = Arc::new(OnceLock::new());
            let api = MiddlewareApi {
                get_state: store.state_reader(),
                dispatch: Arc::clone(&slot),
            };

            for middleware in &middlewares {
                middleware.attach(&api)?;
            }

            let chain: Vec<Compose<Dispatcher<S>>> = middlewares
                .iter()
                .map(|middleware| {
                    let middleware = Arc::clone(middleware);
                    let api = api.clone();
                    Box::new(move |next: Dispatcher<S>| {
                        Dispatcher::new(move |action| middleware.handle(&api, &next, action))
                    }) as Compose<Dispatcher<S>>
                })
                .collect();

            let dispatcher = compose_middleware(chain)(store.dispatcher());
            let _ = slot.set(dispatcher.downgrade());
            log::debug!("Installed {} middleware", middlewares.len());

            Ok(store.with_dispatcher(dispatcher))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::reducer::create_reducer;
    use crate::store::create_store;
    use std::sync::Mutex;

    fn tagging(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware<u32>> {
        Arc::new(
            move |_: &MiddlewareApi<u32>, next: &Dispatcher<u32>, action: Dispatchable<u32>| {
                log.lock().unwrap().push(format!("{tag}-before"));
                let result = next.dispatch(action);
                log.lock().unwrap().push(format!("{tag}-after"));
                result
            },
        )
    }

    fn counter() -> impl crate::reducer::Reducer<u32> {
        create_reducer(0_u32)
            .case("clicks/add", |n, _| Arc::new(**n + 1))
            .build()
    }

    #[test]
    fn test_compose_is_right_associative() {
        let add_one: Compose<String> = Box::new(|s| format!("a({s})"));
        let add_two: Compose<String> = Box::new(|s| format!("b({s})"));
        let add_three: Compose<String> = Box::new(|s| format!("c({s})"));

        assert_eq!(compose_middleware(vec![add_one, add_two, add_three])("x".into()), "a(b(c(x)))");
        assert_eq!(compose_middleware::<String>(vec![])("x".into()), "x");
        let single: Compose<String> = Box::new(|s| format!("only({s})"));
        assert_eq!(compose_middleware(vec![single])("x".into()), "only(x)");
    }

    #[test]
    fn test_first_middleware_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = create_store(
            counter(),
            None,
            Some(apply_middleware(vec![
                tagging("A", Arc::clone(&log)),
                tagging("B", Arc::clone(&log)),
            ])),
        )
        .unwrap();

        let _ = store.dispatch(Action::new("clicks/add")).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["A-before", "B-before", "B-after", "A-after"]
        );
        assert_eq!(*store.get_state().unwrap(), 1);
    }

    #[test]
    fn test_dispatch_during_attach_is_premature() {
        struct Eager;
        impl Middleware<u32> for Eager {
            fn attach(&self, api: &MiddlewareApi<u32>) -> Result<()> {
                let _ = api.dispatch(Action::new("clicks/add"))?;
                Ok(())
            }

            fn handle(
                &self,
                _api: &MiddlewareApi<u32>,
                next: &Dispatcher<u32>,
                action: Dispatchable<u32>,
            ) -> Result<Dispatched> {
                next.dispatch(action)
            }
        }

        let eager: Arc<dyn Middleware<u32>> = Arc::new(Eager);
        let result = create_store(counter(), None, Some(apply_middleware(vec![eager])));
        assert!(matches!(result, Err(StoreError::PrematureDispatch)));
    }

    #[test]
    fn test_api_outliving_store_reports_dropped() {
        #[derive(Default)]
        struct Keeper(OnceLock<MiddlewareApi<u32>>);
        impl Middleware<u32> for Keeper {
            fn attach(&self, api: &MiddlewareApi<u32>) -> Result<()> {
                let _ = self.0.set(api.clone());
                Ok(())
            }

            fn handle(
                &self,
                _api: &MiddlewareApi<u32>,
                next: &Dispatcher<u32>,
                action: Dispatchable<u32>,
            ) -> Result<Dispatched> {
                next.dispatch(action)
            }
        }

        let keeper = Arc::new(Keeper::default());
        let middlewares: Vec<Arc<dyn Middleware<u32>>> = vec![keeper.clone()];
        let store = create_store(counter(), None, Some(apply_middleware(middlewares))).unwrap();
        let api = keeper.0.get().unwrap().clone();

        let _ = api.dispatch(Action::new("clicks/add")).unwrap();
        assert_eq!(*store.get_state().unwrap(), 1);

        drop(store);
        assert!(matches!(
            api.dispatch(Action::new("clicks/add")),
            Err(StoreError::StoreDropped)
        ));
    }

    #[test]
    fn test_api_dispatch_reenters_the_whole_chain() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let recorder: Arc<dyn Middleware<u32>> = Arc::new(
            move |_: &MiddlewareApi<u32>, next: &Dispatcher<u32>, action: Dispatchable<u32>| {
                sink.lock().unwrap().push(action.describe().to_string());
                next.dispatch(action)
            },
        );
        let redirect: Arc<dyn Middleware<u32>> = Arc::new(
            |api: &MiddlewareApi<u32>, next: &Dispatcher<u32>, action: Dispatchable<u32>| {
                if action.describe() == "clicks/double" {
                    let _ = api.dispatch(Action::new("clicks/add"))?;
                    return api.dispatch(Action::new("clicks/add"));
                }
                next.dispatch(action)
            },
        );

        let store = create_store(counter(), None, Some(apply_middleware(vec![recorder, redirect]))).unwrap();
        let _ = store.dispatch(Action::new("clicks/double")).unwrap();

        assert_eq!(*store.get_state().unwrap(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["clicks/double", "clicks/add", "clicks/add"]
        );
    }

    #[test]
    fn test_middleware_can_swallow_actions() {
        let blocker: Arc<dyn Middleware<u32>> = Arc::new(
            |_: &MiddlewareApi<u32>, next: &Dispatcher<u32>, action: Dispatchable<u32>| match action {
                Dispatchable::Action(action) if action.kind == "clicks/add" => Ok(Dispatched::Action(action)),
                other => next.dispatch(other),
            },
        );
        let store = create_store(counter(), None, Some(apply_middleware(vec![blocker]))).unwrap();
        let _ = store.dispatch(Action::new("clicks/add")).unwrap();
        assert_eq!(*store.get_state().unwrap(), 0);
    }
}
