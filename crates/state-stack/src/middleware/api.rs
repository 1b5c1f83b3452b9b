//! ApiMiddleware - turns `api` actions into REQUEST / SUCCESS / FAILURE flows
//!
//! An action carrying an `api` field describes an external call:
//!
//! ```json
//! {
//!   "type": "quests/fetch",
//!   "api": {
//!     "types": ["quests/fetchRequest", "quests/fetchSuccess", "quests/fetchFailure"],
//!     "url": "/quests",
//!     "method": "GET"
//!   }
//! }
//! ```
//!
//! The middleware owns these actions and answers with a
//! [`Dispatched::Pending`]. Nothing happens until that future is polled: it
//! dispatches REQUEST, performs the call, then dispatches SUCCESS (payload =
//! response) or FAILURE (payload = message, `error: true`). A failed call also
//! fails the awaited result. Dropping the future without polling it leaves
//! the store untouched. Any other action passes through.

use super::{Middleware, MiddlewareApi};
use crate::action::{Action, Dispatchable, Dispatched};
use crate::config::ApiConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Field that marks an action as an API call.
pub const API_FIELD: &str = "api";

/// Description of one external call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    /// REQUEST, SUCCESS and FAILURE action types; any of them may be omitted.
    #[serde(default)]
    pub types: [Option<String>; 3],

    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ApiCall {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            types: [None, None, None],
            url: url.into(),
            method: default_method(),
            data: Value::Null,
        }
    }

    pub fn types(
        mut self,
        request: impl Into<String>,
        success: impl Into<String>,
        failure: impl Into<String>,
    ) -> Self {
        self.types = [Some(request.into()), Some(success.into()), Some(failure.into())];
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// The call carried by `action`, or `None` when it has no `api` field.
    pub fn from_action(action: &Action) -> Option<Result<Self>> {
        let marker = action.get_field(API_FIELD)?;
        Some(serde_json::from_value(marker.clone()).map_err(|e| {
            StoreError::InvalidAction(format!("\"{}\" has a malformed api field: {}", action.kind, e))
        }))
    }

    /// Wrap this call in an action of type `kind`.
    pub fn to_action(&self, kind: impl Into<String>) -> Result<Action> {
        let marker = serde_json::to_value(self).map_err(|e| StoreError::InvalidAction(e.to_string()))?;
        Ok(Action::new(kind).field(API_FIELD, marker))
    }

    fn resolve_url(&mut self, base_url: Option<&str>) {
        let Some(base) = base_url else {
            return;
        };
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            return;
        }
        self.url = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            self.url.trim_start_matches('/')
        );
    }
}

/// Transport used by [`ApiMiddleware`].
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Perform the call and return the decoded response body.
    async fn call(&self, call: &ApiCall) -> anyhow::Result<Value>;
}

/// [`ApiClient`] backed by an async closure.
pub struct FnApiClient<F> {
    call: F,
}

impl<F> FnApiClient<F> {
    pub fn new<Fut>(call: F) -> Self
    where
        F: Fn(ApiCall) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self { call }
    }
}

#[async_trait]
impl<F, Fut> ApiClient for FnApiClient<F>
where
    F: Fn(ApiCall) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, call: &ApiCall) -> anyhow::Result<Value> {
        (self.call)(call.clone()).await
    }
}

pub struct ApiMiddleware {
    client: Arc<dyn ApiClient>,
    base_url: Option<String>,
}

impl ApiMiddleware {
    pub fn new(client: impl ApiClient + 'static) -> Self {
        Self {
            client: Arc::new(client),
            base_url: None,
        }
    }

    pub fn from_config(client: impl ApiClient + 'static, config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            ..Self::new(client)
        }
    }

    /// Prefix relative URLs with `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl<S> Middleware<S> for ApiMiddleware
where
    S: Send + Sync + 'static,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S>,
        next: &Dispatcher<S>,
        action: Dispatchable<S>,
    ) -> Result<Dispatched> {
        let Dispatchable::Action(action) = action else {
            return next.dispatch(action);
        };
        let Some(call) = ApiCall::from_action(&action) else {
            return next.dispatch(action);
        };

        let mut call = call?;
        call.resolve_url(self.base_url.as_deref());
        let [request, success, failure] = call.types.clone();

        let client = Arc::clone(&self.client);
        let dispatcher = api.dispatcher();
        let origin = action.kind;
        Ok(Dispatched::Pending(Box::pin(async move {
            if let Some(request) = request {
                let meta = serde_json::json!({ "url": call.url });
                let _ = dispatcher.dispatch(Action::new(request).meta(meta))?;
            }
            log::debug!("API call {} {} for {}", call.method, call.url, origin);

            match client.call(&call).await {
                Ok(response) => {
                    if let Some(success) = success {
                        let _ = dispatcher.dispatch(Action::with_payload(success, response.clone()))?;
                    }
                    Ok(response)
                }
                Err(e) => {
                    log::warn!("API call {} {} failed: {:#}", call.method, call.url, e);
                    if let Some(failure) = failure {
                        let _ = dispatcher.dispatch(Action::with_payload(failure, format!("{:#}", e)).failed())?;
                    }
                    Err(StoreError::effect(e))
                }
            }
        })))
    }
}
