//! The per-connection session engine.
//!
//! A [`Session`] owns one transport and runs the protocol state machine
//! over it:
//!
//! 1. **Handshake**: `initialize` request, `notifications/initialized`
//!    notification, version agreement
//! 2. **Operation**: correlating responses to in-flight requests and
//!    dispatching inbound requests/notifications to registered handlers
//! 3. **Shutdown**: transport disconnect or explicit close; every pending
//!    waiter resolves with a closed error
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Initializing ──initialized──▶ Ready ──▶ Closed
//!       │                            │                          │
//!       └────────────────────────────┴──────────────────────────┴─ transport error
//! ```
//!
//! # Concurrency
//!
//! One I/O task per session owns the transport: it reads messages strictly
//! in arrival order and drains the outbound queue, so writes are serialised
//! one whole frame at a time. Request handlers run on spawned tasks bounded
//! by a semaphore, which means responses may leave in a different order
//! than their requests arrived — correlation is by id, never by position.

mod router;

pub use router::{HandlerResult, NotificationHandler, RequestHandler, Router};

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Notify, Semaphore};

use crate::config::SessionConfig;
use crate::rpc::{
    ErrorObject, Message, Notification, Request, RequestId, Response,
};
use crate::transport::{Transport, TransportError};

/// Method name of the handshake request.
const METHOD_INITIALIZE: &str = "initialize";
/// Method name of the handshake completion notification.
const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";

/// Which side of the handshake this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The initiating party: sends `initialize`, gated on outbound requests.
    Client,
    /// The responding party: answers `initialize`, gated on inbound requests.
    Server,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handshake traffic yet.
    Uninitialized,
    /// `initialize` exchanged, waiting for the initialized notification.
    Initializing,
    /// Normal operation.
    Ready,
    /// Torn down; no further traffic.
    Closed,
}

/// Errors surfaced to callers of the session API.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is closed; nothing can be sent and pending calls fail.
    #[error("session is closed")]
    Closed,

    /// The configured per-request timeout elapsed.
    #[error("request timed out: {method}")]
    Timeout {
        /// Method of the timed-out request.
        method: String,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot send {method:?} in session state {state:?}")]
    InvalidState {
        /// State the session was in.
        state: SessionState,
        /// Method that was attempted.
        method: String,
    },

    /// The peer answered with a JSON-RPC error.
    #[error("peer returned an error: {0}")]
    Rpc(ErrorObject),
}

/// Resolution sent to a pending waiter.
type WaiterResult = Result<Value, ErrorObject>;

struct Shared {
    role: Role,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    pending: tokio::sync::Mutex<HashMap<RequestId, oneshot::Sender<WaiterResult>>>,
    // Unbounded on purpose: the I/O task both enqueues responses and drains
    // this queue, so a bounded queue could wedge it against itself.
    out_tx: mpsc::UnboundedSender<Message>,
    next_id: AtomicI64,
    shutdown: Notify,
    handler_sem: Arc<Semaphore>,
    protocol_version: RwLock<Option<String>>,
}

/// A handle to a running protocol session.
///
/// Handles are cheap to clone; all clones refer to the same connection.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Spawns a session over `transport` with the given handler tables.
    ///
    /// The returned handle can be cloned freely; the session lives until
    /// the transport closes or [`Session::close`] is called.
    #[must_use]
    pub fn spawn(
        transport: impl Transport + 'static,
        router: Router,
        role: Role,
        config: SessionConfig,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let handler_sem = Arc::new(Semaphore::new(config.max_concurrent_requests));

        let shared = Arc::new(Shared {
            role,
            config,
            state: watch::Sender::new(SessionState::Uninitialized),
            pending: tokio::sync::Mutex::new(HashMap::new()),
            out_tx,
            next_id: AtomicI64::new(1),
            shutdown: Notify::new(),
            handler_sem,
            protocol_version: RwLock::new(None),
        });

        tokio::spawn(run_io(transport, Arc::new(router), out_rx, Arc::clone(&shared)));

        Self { shared }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Returns the negotiated protocol version once the handshake settled.
    #[must_use]
    pub fn negotiated_version(&self) -> Option<String> {
        self.shared
            .protocol_version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_negotiated_version(&self, version: &str) {
        *self
            .shared
            .protocol_version
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(version.to_string());
    }

    /// Sends a request and waits for the matching response.
    ///
    /// A fresh id is allocated per call; concurrent callers each wait on
    /// their own response. The configured timeout, if any, cancels only
    /// this call's waiter.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::InvalidState`] when the lifecycle
    /// forbids the request, [`SessionError::Closed`] when the session
    /// ends before the response arrives, [`SessionError::Timeout`] on
    /// timeout, and [`SessionError::Rpc`] when the peer answers with an
    /// error object.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, SessionError> {
        self.check_outbound_request(method)?;

        let id = RequestId::Number(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(id.clone(), tx);

        // Re-check after registering the waiter: a concurrent close() may
        // have drained the pending map between the gate and the insert.
        if self.state() == SessionState::Closed {
            self.shared.pending.lock().await.remove(&id);
            return Err(SessionError::Closed);
        }

        let request = Message::Request(Request::new(id.clone(), method, params));
        if self.shared.out_tx.send(request).is_err() {
            self.shared.pending.lock().await.remove(&id);
            return Err(SessionError::Closed);
        }

        let outcome = match self.shared.config.request_timeout {
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(received) => received,
                Err(_elapsed) => {
                    // Only this call's correlation entry is dropped.
                    self.shared.pending.lock().await.remove(&id);
                    return Err(SessionError::Timeout {
                        method: method.to_string(),
                    });
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(SessionError::Rpc(error)),
            Err(_closed) => Err(SessionError::Closed),
        }
    }

    /// Sends a notification. Fire-and-forget: no response is expected and
    /// delivery failures surface only as session shutdown.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::Closed`] when the session is closed.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), SessionError> {
        if self.state() == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        let message = Message::Notification(Notification::new(method, params));
        self.shared
            .out_tx
            .send(message)
            .map_err(|_| SessionError::Closed)?;

        if self.shared.role == Role::Client && method == NOTIFICATION_INITIALIZED {
            self.shared
                .advance(SessionState::Initializing, SessionState::Ready);
        }

        Ok(())
    }

    /// Closes the session. Idempotent.
    ///
    /// Every suspended [`Session::send_request`] call resolves with
    /// [`SessionError::Closed`]; subsequent sends fail immediately.
    pub async fn close(&self) {
        self.shared.finish().await;
    }

    /// Waits until the session reaches [`SessionState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        // The sender lives in `shared`, which we hold, so this cannot fail.
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }

    fn check_outbound_request(&self, method: &str) -> Result<(), SessionError> {
        let state = self.state();
        if state == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        match self.shared.role {
            Role::Client => {
                if method == METHOD_INITIALIZE {
                    // Only one handshake per session.
                    if state == SessionState::Uninitialized {
                        self.shared
                            .advance(SessionState::Uninitialized, SessionState::Initializing);
                        return Ok(());
                    }
                } else if state == SessionState::Ready {
                    return Ok(());
                }
                Err(SessionError::InvalidState {
                    state,
                    method: method.to_string(),
                })
            }
            Role::Server => {
                if state == SessionState::Ready {
                    Ok(())
                } else {
                    Err(SessionError::InvalidState {
                        state,
                        method: method.to_string(),
                    })
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn force_ready(&self) {
        self.shared.state.send_replace(SessionState::Ready);
    }
}

impl Shared {
    /// Compare-and-set lifecycle transition.
    fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Tears the session down. Idempotent; fails all pending waiters.
    async fn finish(&self) {
        let was_open = self.state.send_if_modified(|state| {
            if *state == SessionState::Closed {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        });
        if !was_open {
            return;
        }

        // Dropping the senders resolves every waiter with a closed error.
        self.pending.lock().await.clear();
        self.shutdown.notify_one();
        tracing::debug!("session closed");
    }

    /// Resolves the waiter registered for a response's id, exactly once.
    async fn resolve_response(&self, response: Response) {
        let waiter = self.pending.lock().await.remove(&response.id);
        match waiter {
            Some(tx) => {
                // The receiver may have timed out in the meantime.
                let _ = tx.send(response.outcome);
            }
            None => {
                // Either the peer answered twice or invented an id.
                tracing::warn!(id = %response.id, "discarding response with no matching request");
            }
        }
    }

    /// Gate for inbound requests on the server side of the handshake.
    fn check_inbound_request(&self, method: &str) -> Result<(), ErrorObject> {
        let state = *self.state.borrow();
        match (method, state) {
            (METHOD_INITIALIZE, SessionState::Uninitialized) => Ok(()),
            (METHOD_INITIALIZE, _) => Err(ErrorObject::invalid_request(
                "session already initialised",
            )),
            (_, SessionState::Ready) => Ok(()),
            _ => Err(ErrorObject::invalid_request("session not initialised")),
        }
    }

    /// Records the lifecycle effects of a successful `initialize` answer.
    fn note_initialize_success(&self, result: &Value) {
        self.advance(SessionState::Uninitialized, SessionState::Initializing);
        if let Some(version) = result.get("protocolVersion").and_then(Value::as_str) {
            *self
                .protocol_version
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(version.to_string());
        }
    }

    fn respond(&self, response: Response) {
        // A send failure means the session is shutting down; the response
        // has nowhere to go.
        let _ = self.out_tx.send(Message::Response(response));
    }

    fn report_decode_failure(&self, error: &crate::rpc::DecodeError) {
        tracing::warn!(error = %error, "received undecodable frame");
        if let Some(id) = error.id() {
            self.respond(Response::error(id.clone(), error.to_error_object()));
        }
    }
}

/// Routes one inbound message: responses resolve waiters, requests and
/// notifications go to their handlers.
async fn dispatch(shared: &Arc<Shared>, message: Message, router: &Arc<Router>) {
    match message {
        Message::Response(response) => shared.resolve_response(response).await,
        Message::Request(request) => dispatch_request(shared, request, router),
        Message::Notification(notification) => {
            dispatch_notification(shared, notification, router);
        }
    }
}

fn dispatch_request(shared: &Arc<Shared>, request: Request, router: &Arc<Router>) {
    if shared.role == Role::Server {
        if let Err(error) = shared.check_inbound_request(&request.method) {
            shared.respond(Response::error(request.id, error));
            return;
        }
    }

    let Some(handler) = router.request_handler(&request.method) else {
        let error = ErrorObject::method_not_found(&request.method);
        shared.respond(Response::error(request.id, error));
        return;
    };

    let shared = Arc::clone(shared);
    let semaphore = Arc::clone(&shared.handler_sem);
    tokio::spawn(async move {
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };

        let outcome = handler.handle(request.params).await;
        if request.method == METHOD_INITIALIZE {
            if let Ok(result) = &outcome {
                shared.note_initialize_success(result);
            }
        }

        shared.respond(Response {
            id: request.id,
            outcome,
        });
    });
}

fn dispatch_notification(shared: &Arc<Shared>, notification: Notification, router: &Arc<Router>) {
    if notification.method == NOTIFICATION_INITIALIZED
        && shared.advance(SessionState::Initializing, SessionState::Ready)
    {
        tracing::debug!("session ready");
    }

    let Some(handler) = router.notification_handler(&notification.method) else {
        // Protocol tolerance: unrecognised notifications are ignored.
        tracing::debug!(method = %notification.method, "ignoring unrecognised notification");
        return;
    };

    let semaphore = Arc::clone(&shared.handler_sem);
    tokio::spawn(async move {
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };
        handler.handle(notification.params).await;
    });
}

/// The I/O task: single reader, serialised writer.
async fn run_io(
    mut transport: impl Transport,
    router: Arc<Router>,
    mut out_rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            () = shared.shutdown.notified() => break,

            outbound = out_rx.recv() => {
                let Some(message) = outbound else { break };
                if let Err(error) = transport.write(&message).await {
                    tracing::error!(error = %error, "transport write failed");
                    break;
                }
            }

            inbound = transport.read_next() => match inbound {
                Ok(message) => dispatch(&shared, message, &router).await,
                Err(TransportError::Decode(error)) => shared.report_decode_failure(&error),
                Err(TransportError::Closed) => {
                    tracing::debug!("transport closed by peer");
                    break;
                }
                Err(error) => {
                    tracing::error!(error = %error, "transport read failed");
                    break;
                }
            },
        }
    }

    shared.finish().await;
}
