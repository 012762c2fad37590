//! Newline-delimited message framing.
//!
//! The stdio framing of MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//!
//! The transport is generic over the byte channel, so the same code serves
//! a process's stdin/stdout, a socket, or an in-memory duplex pair in
//! tests.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use super::{Transport, TransportError};
use crate::rpc::{codec, Message};

/// A newline-delimited message transport over any byte channel.
pub struct LineTransport<R, W> {
    /// Line reader over the inbound byte stream.
    lines: Lines<BufReader<R>>,
    /// Outbound byte stream.
    writer: W,
}

impl<R, W> LineTransport<R, W>
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
        }
    }
}

impl LineTransport<tokio::io::Stdin, tokio::io::Stdout> {
    /// Creates the stdio transport: messages in on stdin, out on stdout.
    ///
    /// stderr is left free for logging.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, message: &Message) -> Result<(), TransportError> {
        let json = codec::encode(message);

        // Framing invariant: one message per line.
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    async fn read_next(&mut self) -> Result<Message, TransportError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(TransportError::Closed);
            };

            if line.trim().is_empty() {
                continue;
            }

            return Ok(codec::decode(&line)?);
        }
    }
}
