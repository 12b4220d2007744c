//! Stdio transports with 4-byte big-endian length framing.
//!
//! [`StdioTransport`] frames this process's own stdin/stdout (the server
//! side of a subprocess backend). [`ChildProcessTransport`] spawns a child
//! and frames its pipes (the gateway side).

use std::process::Stdio;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{Stdin, Stdout};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, trace, warn};

use polymcp_core::protocol::JsonRpcMessage;

use crate::framing::{decode_message, encode_message, length_codec};
use crate::{ProtocolKind, Result, Transport, TransportError, TransportReceiver, TransportSender};

/// Transport over this process's stdin/stdout.
pub struct StdioTransport {
    reader: FramedRead<Stdin, LengthDelimitedCodec>,
    writer: FramedWrite<Stdout, LengthDelimitedCodec>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: FramedRead::new(tokio::io::stdin(), length_codec()),
            writer: FramedWrite::new(tokio::io::stdout(), length_codec()),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdioTransport {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Stdio
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportSender>, Box<dyn TransportReceiver>) {
        (
            Box::new(StdioSender {
                writer: self.writer,
            }),
            Box::new(StdioReceiver {
                reader: self.reader,
            }),
        )
    }
}

struct StdioSender {
    writer: FramedWrite<Stdout, LengthDelimitedCodec>,
}

#[async_trait]
impl TransportSender for StdioSender {
    async fn send(&mut self, message: &JsonRpcMessage) -> Result<()> {
        let body = encode_message(message)?;
        trace!(bytes = body.len(), "sending stdio frame");
        self.writer
            .send(body)
            .await
            .map_err(|e| TransportError::Network {
                message: format!("stdout write failed: {e}"),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.close().await.ok();
        debug!("stdio transport closed");
        Ok(())
    }
}

struct StdioReceiver {
    reader: FramedRead<Stdin, LengthDelimitedCodec>,
}

#[async_trait]
impl TransportReceiver for StdioReceiver {
    async fn receive(&mut self) -> Result<JsonRpcMessage> {
        match self.reader.next().await {
            Some(Ok(frame)) => decode_message(&frame),
            Some(Err(e)) => Err(TransportError::Network {
                message: format!("stdin read failed: {e}"),
            }),
            None => Err(TransportError::ConnectionClosed),
        }
    }
}

/// Transport over a spawned child process's stdin/stdout.
pub struct ChildProcessTransport {
    child: Child,
    reader: FramedRead<ChildStdout, LengthDelimitedCodec>,
    writer: FramedWrite<ChildStdin, LengthDelimitedCodec>,
    command: String,
}

impl ChildProcessTransport {
    /// Spawn `command args...` with the given extra environment and frame
    /// its pipes. The child's stderr is inherited so its logs stay visible.
    pub fn spawn(command: &str, args: &[String], env: &[(String, String)]) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| TransportError::Connection {
            message: format!("failed to spawn '{command}': {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::Connection {
            message: format!("child '{command}' has no stdin pipe"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Connection {
            message: format!("child '{command}' has no stdout pipe"),
        })?;

        debug!(command = %command, pid = ?child.id(), "spawned child process backend");
        Ok(Self {
            child,
            reader: FramedRead::new(stdout, length_codec()),
            writer: FramedWrite::new(stdin, length_codec()),
            command: command.to_string(),
        })
    }

    /// Whether the child is still running. Used for the settle check after
    /// spawn, before the transport is handed to a client.
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(command = %self.command, %status, "child process exited");
                false
            }
            Err(e) => {
                warn!(command = %self.command, error = %e, "failed to poll child process");
                false
            }
        }
    }
}

impl Transport for ChildProcessTransport {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Stdio
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportSender>, Box<dyn TransportReceiver>) {
        (
            Box::new(ChildSender {
                writer: self.writer,
                child: self.child,
                command: self.command,
            }),
            Box::new(ChildReceiver {
                reader: self.reader,
            }),
        )
    }
}

struct ChildSender {
    writer: FramedWrite<ChildStdin, LengthDelimitedCodec>,
    child: Child,
    command: String,
}

#[async_trait]
impl TransportSender for ChildSender {
    async fn send(&mut self, message: &JsonRpcMessage) -> Result<()> {
        let body = encode_message(message)?;
        self.writer
            .send(body)
            .await
            .map_err(|e| TransportError::Network {
                message: format!("write to child '{}' failed: {e}", self.command),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.close().await.ok();
        if let Err(e) = self.child.start_kill() {
            debug!(command = %self.command, error = %e, "child already exited");
        }
        Ok(())
    }
}

struct ChildReceiver {
    reader: FramedRead<ChildStdout, LengthDelimitedCodec>,
}

#[async_trait]
impl TransportReceiver for ChildReceiver {
    async fn receive(&mut self) -> Result<JsonRpcMessage> {
        match self.reader.next().await {
            Some(Ok(frame)) => decode_message(&frame),
            Some(Err(e)) => Err(TransportError::Network {
                message: format!("read from child failed: {e}"),
            }),
            None => Err(TransportError::ConnectionClosed),
        }
    }
}
