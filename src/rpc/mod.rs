//! JSON-RPC 2.0 envelopes and MCP payload types.
//!
//! This module owns the wire vocabulary of the crate: the three envelope
//! shapes (request, response, notification), the codec that maps them to
//! and from single-line JSON frames, and the typed parameter/result
//! structures of the MCP protocol methods.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        rpc module                        │
//! │                                                          │
//! │   ┌─────────────┐    ┌─────────────┐    ┌────────────┐   │
//! │   │  message    │◀──▶│    codec    │    │   types    │   │
//! │   │ (envelopes) │    │ (framing)   │    │ (payloads) │   │
//! │   └─────────────┘    └─────────────┘    └────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod codec;
pub mod message;
pub mod types;

pub use codec::{decode, encode, DecodeError};
pub use message::{
    ErrorCode, ErrorObject, Message, Notification, Request, RequestId, Response, JSONRPC_VERSION,
};
pub use types::{LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
