//! Event-stream (SSE-style) message framing.
//!
//! One message per event, using the `text/event-stream` field grammar:
//!
//! ```text
//! event: message
//! data: {"jsonrpc":"2.0", ...}
//!
//! ```
//!
//! An event is terminated by a blank line. Multiple `data:` lines within
//! one event are joined with a newline before decoding. Comment lines
//! (leading `:`) and fields other than `data` are ignored, which tolerates
//! keep-alive comments and `id:`/`retry:` fields from HTTP event sources.
//!
//! How the byte stream is obtained (an HTTP response body, a pipe) is the
//! caller's concern; the transport only frames it.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use super::{Transport, TransportError};
use crate::rpc::{codec, Message};

/// An SSE-style event-stream transport over any byte channel.
pub struct EventStreamTransport<R, W> {
    /// Line reader over the inbound byte stream.
    lines: Lines<BufReader<R>>,
    /// Outbound byte stream.
    writer: W,
    /// `data:` payload lines of the event currently being read.
    data: Vec<String>,
}

impl<R, W> EventStreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a transport over the given reader/writer pair.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            data: Vec::new(),
        }
    }
}

#[async_trait]
impl<R, W> Transport for EventStreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, message: &Message) -> Result<(), TransportError> {
        let json = codec::encode(message);

        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(b"event: message\n").await?;
        self.writer.write_all(b"data: ").await?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    async fn read_next(&mut self) -> Result<Message, TransportError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(TransportError::Closed);
            };

            if line.is_empty() {
                // Event terminator. Blank lines between events carry no data.
                if self.data.is_empty() {
                    continue;
                }
                let payload = self.data.join("\n");
                self.data.clear();
                return Ok(codec::decode(&payload)?);
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // Other fields (event:, id:, retry:) don't affect framing.
        }
    }
}
