//! Encoding and decoding of JSON-RPC 2.0 envelopes.
//!
//! The codec maps between [`Message`] values and the single-line JSON text
//! the transports carry. Decoding distinguishes two failure classes:
//!
//! - **Parse errors** (−32700): the bytes are not valid JSON at all
//! - **Invalid requests** (−32600): valid JSON that matches none of the
//!   three message shapes
//!
//! Request vs notification is decided solely by the presence of `id`.
//! When an invalid message still carried a usable `id`, the decode error
//! keeps it so the session can answer the peer instead of staying silent.

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::message::{
    ErrorCode, ErrorObject, Message, Notification, Request, RequestId, Response, JSONRPC_VERSION,
};

/// A failure to decode one wire frame into a [`Message`].
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The frame was not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// The frame was valid JSON but not a valid JSON-RPC 2.0 message.
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// What was wrong with the shape.
        reason: String,
        /// Request ID recovered from the frame, when one was present and
        /// well-formed.
        id: Option<RequestId>,
    },
}

impl DecodeError {
    fn invalid(reason: impl Into<String>, id: Option<RequestId>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
            id,
        }
    }

    /// The JSON-RPC error code this failure maps to.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse(_) => ErrorCode::ParseError,
            Self::InvalidMessage { .. } => ErrorCode::InvalidRequest,
        }
    }

    /// The request ID recovered from the invalid frame, if any.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Parse(_) => None,
            Self::InvalidMessage { id, .. } => id.as_ref(),
        }
    }

    /// Converts this failure into the error object to report to the peer.
    #[must_use]
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject::with_message(self.code(), self.to_string())
    }
}

/// Encodes a message as a single-line JSON string.
///
/// Encoding cannot fail for messages constructed through this crate's
/// types: the output is built as a JSON value and rendered directly.
#[must_use]
pub fn encode(message: &Message) -> String {
    let value = match message {
        Message::Request(req) => {
            let mut obj = json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": req.id,
                "method": req.method,
            });
            if let Some(params) = &req.params {
                obj["params"] = params.clone();
            }
            obj
        }
        Message::Notification(notif) => {
            let mut obj = json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": notif.method,
            });
            if let Some(params) = &notif.params {
                obj["params"] = params.clone();
            }
            obj
        }
        Message::Response(resp) => match &resp.outcome {
            Ok(result) => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": resp.id,
                "result": result,
            }),
            Err(error) => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": resp.id,
                "error": error,
            }),
        },
    };

    value.to_string()
}

/// Decodes a single wire frame into a [`Message`].
///
/// # Errors
///
/// Returns [`DecodeError::Parse`] when the frame is not valid JSON, and
/// [`DecodeError::InvalidMessage`] when the JSON matches none of the three
/// message shapes.
pub fn decode(frame: &str) -> Result<Message, DecodeError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| DecodeError::Parse(e.to_string()))?;

    let Value::Object(obj) = value else {
        return Err(DecodeError::invalid("message is not a JSON object", None));
    };

    // An `id` of the wrong type is itself a shape violation, but a
    // well-formed one is kept for error reporting either way.
    let id = decode_id(&obj)?;

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(DecodeError::invalid(
                format!("unsupported jsonrpc version: {other:?}"),
                id,
            ))
        }
        None => return Err(DecodeError::invalid("missing jsonrpc field", id)),
    }

    if obj.contains_key("method") {
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::invalid("method field must be a string", id.clone()))?;
        if method.is_empty() {
            return Err(DecodeError::invalid("method field cannot be empty", id));
        }
        if obj.contains_key("result") || obj.contains_key("error") {
            return Err(DecodeError::invalid(
                "message mixes request and response fields",
                id,
            ));
        }

        let params = obj.get("params").filter(|p| !p.is_null()).cloned();

        return Ok(match id {
            Some(id) => Message::Request(Request::new(id, method, params)),
            None => Message::Notification(Notification::new(method, params)),
        });
    }

    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");

    match (has_result, has_error) {
        (true, true) => Err(DecodeError::invalid(
            "response carries both result and error",
            id,
        )),
        (false, false) => Err(DecodeError::invalid(
            "message has no method, result, or error",
            id,
        )),
        (true, false) => {
            let id = id.ok_or_else(|| DecodeError::invalid("response is missing id", None))?;
            let result = obj.get("result").cloned().unwrap_or(Value::Null);
            Ok(Message::Response(Response::success(id, result)))
        }
        (false, true) => {
            let id = id.ok_or_else(|| DecodeError::invalid("response is missing id", None))?;
            let error: ErrorObject = obj
                .get("error")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| {
                    DecodeError::invalid(format!("malformed error object: {e}"), Some(id.clone()))
                })?
                .unwrap_or_else(|| ErrorObject::from_code(ErrorCode::InternalError));
            Ok(Message::Response(Response::error(id, error)))
        }
    }
}

/// Extracts the `id` field, rejecting the types JSON-RPC forbids for MCP
/// (`null`, booleans, non-integer numbers).
fn decode_id(obj: &Map<String, Value>) -> Result<Option<RequestId>, DecodeError> {
    match obj.get("id") {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s.clone()))),
        Some(Value::Number(n)) => n.as_i64().map(RequestId::Number).map(Some).ok_or_else(|| {
            DecodeError::invalid("id must be an integer or a string", None)
        }),
        Some(other) => Err(DecodeError::invalid(
            format!("id must be an integer or a string, got {other}"),
            None,
        )),
    }
}
