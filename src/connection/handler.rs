//! Connection Handler Module
//!
//! This module handles individual client connections to FlintKV.
//! Each client gets its own task that reads frames, runs them and writes
//! replies, while also forwarding messages published to its channels.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned (fresh id, empty session, inbox)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────────────┐
//!    │      Main Loop                               │
//!    │                                              │
//!    │  ┌────────────────────────────────────────┐  │
//!    │  │ Handle every complete frame buffered   │  │
//!    │  │ (session commands / queue / execute)   │  │
//!    │  └───────────────────┬────────────────────┘  │
//!    │                      ▼                       │
//!    │  ┌────────────────────────────────────────┐  │
//!    │  │ Flush replies                          │  │
//!    │  └───────────────────┬────────────────────┘  │
//!    │                      ▼                       │
//!    │  ┌────────────────────────────────────────┐  │
//!    │  │ select! { socket bytes | inbox msg }   │  │
//!    │  └───────────────────┬────────────────────┘  │
//!    │                      ▼                       │
//!    │                [Loop back]                   │
//!    └──────────────────────────────────────────────┘
//!        │
//!        ▼
//! 4. QUIT / EOF / error
//!        │
//!        ▼
//! 5. Subscriptions released, transport shut down
//! ```
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. TCP is a stream
//! protocol, so a read may hold a partial frame or several frames at once.

use crate::commands::{check_min_arity, CommandError};
use crate::connection::Session;
use crate::protocol::{error_skip_len, ParseError, RespParser, RespValue, MAX_BULK_SIZE};
use crate::pubsub::{ConnectionId, Inbox};
use crate::server::ServerContext;
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer: one maximal bulk string plus framing.
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// What the main loop does after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Handles a single client connection.
///
/// Generic over the transport so tests can drive it with an in-memory
/// stream.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    parser: RespParser,

    id: ConnectionId,
    session: Session,
    ctx: ServerContext,

    /// Published messages addressed to this connection
    inbox_tx: Inbox,
    inbox_rx: mpsc::UnboundedReceiver<RespValue>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    pub fn new(stream: S, addr: SocketAddr, ctx: ServerContext) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let id = ctx.pubsub.allocate_id();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            id,
            session: Session::new(),
            ctx,
            inbox_tx,
            inbox_rx,
        }
    }

    /// Runs the connection until QUIT, end of stream or an I/O failure.
    ///
    /// Whatever ends the loop, the connection is removed from every channel
    /// it subscribed to before returning.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, id = self.id, "Client connected");

        let result = self.main_loop().await;

        if self.session.subscription_count() > 0 {
            self.ctx
                .pubsub
                .unsubscribe_all(self.id, self.session.subscriptions())
                .await;
        }
        if let Err(e) = self.stream.shutdown().await {
            trace!(client = %self.addr, error = %e, "Shutdown failed");
        }

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.next_frame().await? {
                if self.handle_frame(frame).await? == Flow::Quit {
                    self.stream.flush().await?;
                    return Ok(());
                }
            }

            self.stream.flush().await?;
            self.wait_for_input().await?;
        }
    }

    /// Pops the next complete frame off the buffer.
    ///
    /// Malformed input is answered with an error reply and skipped through
    /// the next line terminator, then parsing resumes.
    async fn next_frame(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        while !self.buffer.is_empty() {
            match self.parser.parse(&self.buffer) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.advance(consumed);
                    trace!(
                        client = %self.addr,
                        consumed,
                        remaining = self.buffer.len(),
                        "Parsed frame"
                    );
                    return Ok(Some(frame));
                }
                Ok(None) => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Incomplete frame, need more data"
                    );
                    return Ok(None);
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Parse error");
                    let skip = error_skip_len(&self.buffer);
                    self.buffer.advance(skip);
                    self.write_value(&protocol_error_reply(&e)).await?;
                }
            }
        }
        Ok(None)
    }

    /// Waits for more bytes from the client or a published message.
    async fn wait_for_input(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        tokio::select! {
            read = self.stream.get_mut().read_buf(&mut self.buffer) => {
                let n = read?;
                if n == 0 {
                    return Err(if self.buffer.is_empty() {
                        ConnectionError::ClientDisconnected
                    } else {
                        ConnectionError::UnexpectedEof
                    });
                }
                trace!(client = %self.addr, bytes = n, "Read data");
            }
            Some(message) = self.inbox_rx.recv() => {
                self.write_value(&message).await?;
                self.stream.flush().await?;
                trace!(client = %self.addr, "Forwarded published message");
            }
        }

        Ok(())
    }

    async fn handle_frame(&mut self, frame: RespValue) -> Result<Flow, ConnectionError> {
        let tokens = frame.into_tokens();
        let Some(name) = tokens.first() else {
            self.write_value(&CommandError::Empty.into()).await?;
            return Ok(Flow::Continue);
        };
        let command = name.to_uppercase();

        let reply = match command.as_str() {
            "QUIT" => {
                self.write_value(&RespValue::simple_string("BYE")).await?;
                return Ok(Flow::Quit);
            }
            "SUBSCRIBE" => {
                self.subscribe(&tokens).await?;
                return Ok(Flow::Continue);
            }
            "UNSUBSCRIBE" => {
                self.unsubscribe(&tokens).await?;
                return Ok(Flow::Continue);
            }
            "PUBLISH" => self.publish(&tokens).await,
            "MULTI" => {
                self.session.begin();
                RespValue::ok()
            }
            "DISCARD" => {
                self.session.discard();
                RespValue::ok()
            }
            "EXEC" => match self.session.take_queue() {
                Some(queue) => self.ctx.commands.execute_batch(&queue).await,
                None => CommandError::ExecWithoutMulti.into(),
            },
            _ if self.session.in_transaction() => {
                self.session.enqueue(tokens);
                RespValue::simple_string("QUEUED")
            }
            _ => self.ctx.commands.execute(&tokens).await,
        };

        self.write_value(&reply).await?;
        Ok(Flow::Continue)
    }

    /// SUBSCRIBE channel [channel ...]
    async fn subscribe(&mut self, tokens: &[String]) -> Result<(), ConnectionError> {
        if let Err(e) = check_min_arity(tokens, 2, "subscribe") {
            return self.write_value(&e.into()).await;
        }

        for channel in &tokens[1..] {
            self.ctx
                .pubsub
                .subscribe(self.id, &self.inbox_tx, channel)
                .await;
            let count = self.session.add_subscription(channel);
            self.write_value(&subscription_reply("subscribe", Some(channel), count))
                .await?;
        }

        debug!(client = %self.addr, channels = self.session.subscription_count(), "Subscribed");
        Ok(())
    }

    /// UNSUBSCRIBE [channel ...]
    async fn unsubscribe(&mut self, tokens: &[String]) -> Result<(), ConnectionError> {
        let targets: Vec<String> = if tokens.len() > 1 {
            tokens[1..].to_vec()
        } else {
            self.session.subscriptions().iter().cloned().collect()
        };

        // With nothing to leave, confirm with a single nil-channel reply
        if targets.is_empty() {
            return self
                .write_value(&subscription_reply("unsubscribe", None, 0))
                .await;
        }

        for channel in &targets {
            self.ctx.pubsub.unsubscribe(self.id, channel).await;
            let remaining = self.session.remove_subscription(channel);
            self.write_value(&subscription_reply("unsubscribe", Some(channel), remaining))
                .await?;
        }

        Ok(())
    }

    /// PUBLISH channel message...
    async fn publish(&self, tokens: &[String]) -> RespValue {
        if let Err(e) = check_min_arity(tokens, 3, "publish") {
            return e.into();
        }

        let message = tokens[2..].join(" ");
        let delivered = self.ctx.pubsub.publish(&tokens[1], &message).await;
        RespValue::from(delivered)
    }

    /// Queues a reply on the write buffer. Flushing happens once the
    /// buffered input is drained.
    async fn write_value(&mut self, value: &RespValue) -> Result<(), ConnectionError> {
        let bytes = value.serialize();
        self.stream.write_all(&bytes).await?;
        trace!(client = %self.addr, bytes = bytes.len(), "Queued reply");
        Ok(())
    }
}

fn protocol_error_reply(e: &ParseError) -> RespValue {
    RespValue::error(format!("ERR {e}"))
}

fn subscription_reply(kind: &str, channel: Option<&String>, count: usize) -> RespValue {
    RespValue::array(vec![
        RespValue::from(kind),
        RespValue::from(channel.map(String::as_str)),
        RespValue::from(count),
    ])
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// RESP parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial frame)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion. Outcomes are already logged by
/// [`ConnectionHandler::run`].
pub async fn handle_connection<S>(stream: S, addr: SocketAddr, ctx: ServerContext)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = ConnectionHandler::new(stream, addr, ctx).run().await;
}
