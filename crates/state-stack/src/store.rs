use crate::action::{action_types, Action, Dispatchable, Dispatched};
use crate::dispatcher::{Dispatcher, GetState};
use crate::error::{Result, StoreError};
use crate::reducer::{BoxedReducer, Reducer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

/// Callback invoked after every completed dispatch.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Creates a store from a root reducer and an optional preloaded state.
pub type StoreCreator<S> = Box<dyn FnOnce(BoxedReducer<S>, Option<Arc<S>>) -> Result<Store<S>>>;

/// Wraps store creation, e.g. to install middleware.
pub type Enhancer<S> = Box<dyn FnOnce(StoreCreator<S>) -> StoreCreator<S>>;

struct StoreCore<S> {
    state: RwLock<Arc<S>>,
    reducer: RwLock<BoxedReducer<S>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    is_dispatching: AtomicBool,
}

/// Resets the dispatch flag when the reducer returns, fails or panics.
struct DispatchGuard<'a>(&'a AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S> StoreCore<S>
where
    S: Send + Sync + 'static,
{
    fn is_dispatching(&self) -> bool {
        self.is_dispatching.load(Ordering::Acquire)
    }

    fn get_state(&self) -> Result<Arc<S>> {
        if self.is_dispatching() {
            return Err(StoreError::InvalidStateAccess);
        }
        Ok(Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner)))
    }

    fn dispatch(&self, action: Action) -> Result<Dispatched> {
        action.validate()?;

        if self
            .is_dispatching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StoreError::ReentrantDispatch(action.kind));
        }

        {
            let _guard = DispatchGuard(&self.is_dispatching);
            let reducer = Arc::clone(&self.reducer.read().unwrap_or_else(PoisonError::into_inner));
            let current = Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner));
            log::trace!("Reducing {}", action.kind);
            let next = reducer.reduce(Some(&current), &action)?;
            *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
        }

        self.notify();
        Ok(Dispatched::Action(action))
    }

    fn notify(&self) {
        // Snapshot: listeners added or removed while notifying take effect next time.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

trait ListenerRegistry: Send + Sync {
    fn is_dispatching(&self) -> bool;
    fn remove_listener(&self, id: u64);
}

impl<S> ListenerRegistry for StoreCore<S>
where
    S: Send + Sync + 'static,
{
    fn is_dispatching(&self) -> bool {
        StoreCore::is_dispatching(self)
    }

    fn remove_listener(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Handle returned by [`Store::subscribe`].
///
/// Dropping it does not unsubscribe.
pub struct Subscription {
    id: u64,
    active: AtomicBool,
    registry: Weak<dyn ListenerRegistry>,
}

impl Subscription {
    /// Remove the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) -> Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        if registry.is_dispatching() {
            return Err(StoreError::SubscribeWhileDispatching);
        }
        if self.active.swap(false, Ordering::AcqRel) {
            registry.remove_listener(self.id);
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.registry.strong_count() > 0
    }
}

/// Store - owns the state tree and runs the dispatch loop
///
/// A `Store` is a handle: clones share the same state, reducer and listeners.
/// Create one at startup and pass it to whatever needs it.
///
/// Handles may be sent across threads, but dispatching is meant to happen
/// from one logical thread at a time. There is no queueing: a `dispatch`
/// from another thread while one is in flight is rejected with
/// [`StoreError::ReentrantDispatch`], exactly like a dispatch from inside a
/// reducer.
pub struct Store<S> {
    core: Arc<StoreCore<S>>,
    dispatcher: Dispatcher<S>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

/// Create a store.
///
/// With an `enhancer`, creation is handed to it: the enhancer receives the
/// plain creator and returns the one that is actually called. This is how
/// [`apply_middleware`](crate::apply_middleware) installs its chain.
pub fn create_store<S, R>(
    reducer: R,
    preloaded_state: Option<Arc<S>>,
    enhancer: Option<Enhancer<S>>,
) -> Result<Store<S>>
where
    S: Send + Sync + 'static,
    R: Reducer<S> + 'static,
{
    let reducer: BoxedReducer<S> = Arc::new(reducer);
    match enhancer {
        Some(enhancer) => {
            let creator: StoreCreator<S> = Box::new(create_base_store::<S>);
            enhancer(creator)(reducer, preloaded_state)
        }
        None => create_base_store(reducer, preloaded_state),
    }
}

fn create_base_store<S>(reducer: BoxedReducer<S>, preloaded_state: Option<Arc<S>>) -> Result<Store<S>>
where
    S: Send + Sync + 'static,
{
    log::debug!("Creating store ({})", action_types::INIT);
    let initial = reducer.reduce(preloaded_state.as_ref(), &Action::new(action_types::INIT))?;

    let core = Arc::new(StoreCore {
        state: RwLock::new(initial),
        reducer: RwLock::new(reducer),
        listeners: Mutex::new(Vec::new()),
        next_listener_id: AtomicU64::new(0),
        is_dispatching: AtomicBool::new(false),
    });

    let raw = Arc::clone(&core);
    let dispatcher = Dispatcher::new(move |dispatchable: Dispatchable<S>| match dispatchable {
        Dispatchable::Action(action) => raw.dispatch(action),
        Dispatchable::Thunk(thunk) => Err(StoreError::InvalidAction(format!(
            "\"{}\" is a thunk; install the thunk middleware to dispatch functions",
            thunk.label()
        ))),
    });

    Ok(Store { core, dispatcher })
}

impl<S> Store<S>
where
    S: Send + Sync + 'static,
{
    /// Current state snapshot.
    pub fn get_state(&self) -> Result<Arc<S>> {
        self.core.get_state()
    }

    /// Dispatch an action or thunk through the store's dispatch chain.
    pub fn dispatch(&self, dispatchable: impl Into<Dispatchable<S>>) -> Result<Dispatched> {
        self.dispatcher.dispatch(dispatchable)
    }

    /// Register a listener called after every dispatch, in registration order.
    pub fn subscribe<F>(&self, listener: F) -> Result<Subscription>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.core.is_dispatching() {
            return Err(StoreError::SubscribeWhileDispatching);
        }
        let id = self.core.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.core
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));

        let core: Arc<dyn ListenerRegistry> = self.core.clone();
        Ok(Subscription {
            id,
            active: AtomicBool::new(true),
            registry: Arc::downgrade(&core),
        })
    }

    /// Swap the root reducer and let every slice recompute from the current state.
    pub fn replace_reducer<R>(&self, reducer: R) -> Result<()>
    where
        R: Reducer<S> + 'static,
    {
        if self.core.is_dispatching() {
            return Err(StoreError::ReentrantDispatch(action_types::REPLACE.to_string()));
        }
        *self.core.reducer.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(reducer);
        log::debug!("Root reducer replaced");
        let _ = self.core.dispatch(Action::new(action_types::REPLACE))?;
        Ok(())
    }

    /// The dispatch chain callers should use (includes middleware).
    pub fn dispatcher(&self) -> Dispatcher<S> {
        self.dispatcher.clone()
    }

    pub fn state_reader(&self) -> GetState<S> {
        let core = Arc::clone(&self.core);
        GetState::new(move || core.get_state())
    }

    pub fn is_dispatching(&self) -> bool {
        self.core.is_dispatching()
    }

    pub fn listener_count(&self) -> usize {
        self.core
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Same store, dispatching through `dispatcher` instead.
    pub(crate) fn with_dispatcher(self, dispatcher: Dispatcher<S>) -> Self {
        Self {
            core: self.core,
            dispatcher,
        }
    }
}
