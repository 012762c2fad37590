//! Message transports.
//!
//! A transport delivers whole JSON-RPC messages in order and reports
//! disconnects. The session engine neither knows nor cares whether the
//! underlying channel is a subprocess pipe, a socket, or an in-memory
//! duplex stream; it only sees [`Transport::write`] and
//! [`Transport::read_next`].
//!
//! Two framings are provided, both generic over any `AsyncRead`/`AsyncWrite`
//! pair:
//!
//! - [`LineTransport`]: one message per newline-delimited line (the stdio
//!   framing)
//! - [`EventStreamTransport`]: one message per `data:` event terminated by
//!   a blank line (the SSE framing)

mod event_stream;
mod line;

pub use event_stream::EventStreamTransport;
pub use line::LineTransport;

use async_trait::async_trait;
use thiserror::Error;

use crate::rpc::{DecodeError, Message};

/// Errors surfaced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying channel failed. Fatal to the session.
    #[error("transport I/O failure")]
    Io(#[from] std::io::Error),

    /// The peer closed the channel. Fatal to the session.
    #[error("transport closed")]
    Closed,

    /// A frame arrived that does not decode to a message. Recoverable:
    /// the session reports it to the peer and keeps reading.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl TransportError {
    /// Whether this error ends the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// An ordered, bidirectional message channel between two peers.
///
/// Implementations must deliver whole messages in order and report
/// disconnects via [`TransportError::Closed`].
#[async_trait]
pub trait Transport: Send {
    /// Writes one message to the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialised output cannot be written.
    async fn write(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Reads the next message from the peer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] at end of stream,
    /// [`TransportError::Decode`] for an undecodable frame, and
    /// [`TransportError::Io`] when the channel fails.
    async fn read_next(&mut self) -> Result<Message, TransportError>;
}
