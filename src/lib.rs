//! mcp-session: an embeddable Model Context Protocol session engine.
//!
//! This library implements the protocol machinery itself — no SDK
//! wrapping: JSON-RPC 2.0 framing, request/response correlation, the
//! initialisation handshake, and typed capability registries, all over an
//! abstract transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Client facade            │            Server wiring         │
//! │  (typed operations)       │   (registry-backed handlers)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │                       Session engine                         │
//! │   (lifecycle, correlation, dispatch, timeouts, close)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │          rpc (envelopes + codec + payload types)             │
//! ├──────────────────────────────────────────────────────────────┤
//! │    Transport: newline-delimited  │  SSE-style event stream   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`rpc`] — JSON-RPC 2.0 envelopes, codec, and MCP payload types
//! - [`transport`] — the transport seam and the two bundled framings
//! - [`session`] — the per-connection state machine
//! - [`registry`] — server-side tools, resources, and prompts
//! - [`client`] — typed client operations
//! - [`server`] — registry-backed protocol method handlers
//! - [`config`] — configuration loading and validation
//! - [`error`] — configuration error type

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{Client, ClientError};
pub use config::SessionConfig;
pub use registry::{ApplicationError, Prompt, Registry, RegistryError, Resource, Tool};
pub use server::Server;
pub use session::{Role, Router, Session, SessionError, SessionState};
pub use transport::{EventStreamTransport, LineTransport, Transport, TransportError};
