//! Error taxonomy for the store and its collaborators.

use thiserror::Error;

/// Slice name used when the root reducer itself produced no state.
pub const ROOT_SLICE: &str = "<root>";

/// Errors surfaced by the store, reducer utilities and middleware.
///
/// None of these are meant for end users: they are contract violations and
/// side-effect failures reported to the code that called `dispatch`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The dispatched value is not a record or has no usable `type`.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// `dispatch` was called while a reducer was running.
    #[error("Reducers may not dispatch actions (dispatch of \"{0}\" rejected)")]
    ReentrantDispatch(String),

    /// `get_state` was called while a reducer was running.
    #[error("Cannot read state while the reducer is executing")]
    InvalidStateAccess,

    /// `subscribe` or `unsubscribe` was called while a reducer was running.
    #[error("Cannot subscribe or unsubscribe while the reducer is executing")]
    SubscribeWhileDispatching,

    /// A reducer returned no state.
    #[error("Reducer for slice \"{slice}\" returned no state for action \"{action_type}\"")]
    UndefinedReducerOutput { slice: String, action_type: String },

    /// A slice held a value of a different type than its reducer expects.
    #[error("Slice \"{0}\" holds a value of an unexpected type")]
    SliceTypeMismatch(String),

    /// Middleware called `dispatch` before the chain was wired.
    #[error("Dispatching while constructing middleware is not allowed")]
    PrematureDispatch,

    /// The store behind a middleware facade or thunk no longer exists.
    #[error("The store has been dropped")]
    StoreDropped,

    /// A thunk or API call failed.
    #[error("Side effect failed: {0}")]
    Effect(#[source] anyhow::Error),

    /// Configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl StoreError {
    /// Wrap any error coming out of a side effect.
    pub fn effect(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Effect(err.into())
    }

    /// Whether the error is a programming error rather than a failed effect.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, StoreError::Effect(_) | StoreError::Config(_))
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
