//! BatchMiddleware - expands batch wrappers into their nested actions

use super::{Middleware, MiddlewareApi};
use crate::action::{Dispatchable, Dispatched};
use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// Dispatches each action of a batch wrapper (see
/// [`Action::batch`](crate::Action::batch)) through `next`, in order.
///
/// The wrapper itself never reaches the reducer; it is returned to the caller.
/// A failing nested action stops the batch and its error is returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchMiddleware;

impl<S> Middleware<S> for BatchMiddleware
where
    S: Send + Sync + 'static,
{
    fn handle(
        &self,
        _api: &MiddlewareApi<S>,
        next: &Dispatcher<S>,
        action: Dispatchable<S>,
    ) -> Result<Dispatched> {
        let Dispatchable::Action(wrapper) = action else {
            return next.dispatch(action);
        };
        let Some(nested) = wrapper.batched_actions() else {
            return next.dispatch(wrapper);
        };

        let nested = nested?;
        log::trace!("Expanding batch of {} actions", nested.len());
        for action in nested {
            let _ = next.dispatch(action)?;
        }
        Ok(Dispatched::Action(wrapper))
    }
}
