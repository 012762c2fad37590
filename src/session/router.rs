//! Method routing for inbound traffic.
//!
//! A [`Router`] maps method names to registered handlers. Request handlers
//! produce a result value or a JSON-RPC error object; notification
//! handlers produce nothing. The session engine consults the router from
//! its reader loop and invokes handlers on spawned tasks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::rpc::ErrorObject;

/// Outcome of a request handler: the response payload or an error object
/// to report to the peer.
pub type HandlerResult = Result<Value, ErrorObject>;

/// A handler for inbound requests of one method.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handles one request, returning the result payload or an error.
    async fn handle(&self, params: Option<Value>) -> HandlerResult;
}

/// A handler for inbound notifications of one method.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Handles one notification. Notifications never generate a reply.
    async fn handle(&self, params: Option<Value>);
}

struct FnRequestHandler<F>(F);

#[async_trait]
impl<F, Fut> RequestHandler for FnRequestHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, params: Option<Value>) -> HandlerResult {
        (self.0)(params).await
    }
}

struct FnNotificationHandler<F>(F);

#[async_trait]
impl<F, Fut> NotificationHandler for FnNotificationHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, params: Option<Value>) {
        (self.0)(params).await;
    }
}

/// The handler tables of one session.
///
/// Built before the session is spawned; later registrations under the same
/// method replace the earlier handler.
#[derive(Default)]
pub struct Router {
    requests: HashMap<String, Arc<dyn RequestHandler>>,
    notifications: HashMap<String, Arc<dyn NotificationHandler>>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request handler object for `method`.
    pub fn register_request(&mut self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.requests.insert(method.into(), handler);
    }

    /// Registers an async closure as the request handler for `method`.
    pub fn on_request<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_request(method, Arc::new(FnRequestHandler(handler)));
    }

    /// Registers a notification handler object for `method`.
    pub fn register_notification(
        &mut self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.notifications.insert(method.into(), handler);
    }

    /// Registers an async closure as the notification handler for `method`.
    pub fn on_notification<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_notification(method, Arc::new(FnNotificationHandler(handler)));
    }

    /// Looks up the request handler for `method`.
    #[must_use]
    pub(crate) fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests.get(method).cloned()
    }

    /// Looks up the notification handler for `method`.
    #[must_use]
    pub(crate) fn notification_handler(&self, method: &str) -> Option<Arc<dyn NotificationHandler>> {
        self.notifications.get(method).cloned()
    }
}
