//! ThunkMiddleware - runs dispatched thunks instead of forwarding them

use super::{Middleware, MiddlewareApi};
use crate::action::{Dispatchable, Dispatched};
use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// Invokes a dispatched [`Thunk`](crate::Thunk) with the full dispatch chain
/// and a state reader, returning whatever the thunk returns.
///
/// Plain actions pass through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThunkMiddleware;

impl<S> Middleware<S> for ThunkMiddleware
where
    S: Send + Sync + 'static,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S>,
        next: &Dispatcher<S>,
        action: Dispatchable<S>,
    ) -> Result<Dispatched> {
        match action {
            Dispatchable::Thunk(thunk) => {
                log::trace!("Running thunk {}", thunk.label());
                thunk.run(api.dispatcher(), api.state_reader())
            }
            action => next.dispatch(action),
        }
    }
}
