//! Per-connection line protocol loop.
//!
//! One handler runs per accepted connection. Each complete line goes through
//! parse → authenticate → cache update → log enqueue, and exactly one
//! response line is written back before the next line is read.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;

use crate::error::IngestError;
use crate::observability::metrics;
use crate::protocol::{self, Response};
use crate::server::state::ServerState;
use crate::storage::{LogEntry, LogWriterError};

/// Reasons a connection ends abnormally.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("no complete line within the idle timeout")]
    IdleTimeout,

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("TLS handshake timed out")]
    HandshakeTimeout,
}

impl ConnectionError {
    /// Peer hung up or reset; not worth more than a debug line.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

enum LineRead {
    Line,
    TooLong,
    Eof,
}

/// Read up to and excluding the next `\n` into `buf`, refusing to buffer more
/// than `max` bytes. A trailing `\r` is removed. A final unterminated line
/// before EOF still counts as a line.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if buf.is_empty() { LineRead::Eof } else { LineRead::Line });
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                if buf.len() + end > max {
                    return Ok(LineRead::TooLong);
                }
                buf.extend_from_slice(&available[..end]);
                reader.consume(end + 1);
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                return Ok(LineRead::Line);
            }
            None => {
                let n = available.len();
                if buf.len() + n > max {
                    return Ok(LineRead::TooLong);
                }
                buf.extend_from_slice(available);
                reader.consume(n);
            }
        }
    }
}

/// Drives one connection.
pub struct ConnectionHandler {
    state: Arc<ServerState>,
}

impl ConnectionHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// Serve lines until EOF, a fatal connection error, or shutdown.
    ///
    /// Shutdown only interrupts the wait for the next line; a line already
    /// read is processed and answered first.
    pub async fn run<S>(&self, stream: S, mut shutdown: broadcast::Receiver<()>) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let limits = self.state.limits;
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(1024);

        loop {
            buf.clear();
            let read = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("Closing connection for shutdown");
                    break;
                }
                read = tokio::time::timeout(
                    limits.idle_timeout,
                    read_line(&mut reader, &mut buf, limits.max_line_bytes),
                ) => read,
            };

            match read.map_err(|_| ConnectionError::IdleTimeout)?? {
                LineRead::Eof => break,
                LineRead::TooLong => {
                    let response = Response::Error(format!("Line exceeds {} bytes", limits.max_line_bytes));
                    metrics::record_message("protocol_error", Instant::now());
                    writer.write_all(response.to_line().as_bytes()).await?;
                    writer.flush().await?;
                    return Err(ConnectionError::LineTooLong(limits.max_line_bytes));
                }
                LineRead::Line => {}
            }

            let response = match std::str::from_utf8(&buf) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => self.process_line(text.trim()).await,
                Err(_) => self.reject(IngestError::Protocol("Message is not valid UTF-8".into())),
            };

            writer.write_all(response.to_line().as_bytes()).await?;
            writer.flush().await?;
        }

        let _ = writer.shutdown().await;
        Ok(())
    }

    /// Handle one line and produce its response.
    pub async fn process_line(&self, line: &str) -> Response {
        let start = Instant::now();
        match self.ingest(line).await {
            Ok(()) => {
                metrics::record_message("ack", start);
                Response::Ack
            }
            Err(e) => {
                metrics::record_message(e.outcome(), start);
                self.reject(e)
            }
        }
    }

    fn reject(&self, e: IngestError) -> Response {
        match &e {
            IngestError::Internal(detail) => tracing::error!(error = %detail, "Failed to process line"),
            other => tracing::info!(reason = %other, "Rejected line"),
        }
        Response::Error(e.client_reason())
    }

    async fn ingest(&self, line: &str) -> Result<(), IngestError> {
        let entry = catch_unwind(AssertUnwindSafe(|| self.accept(line)))
            .map_err(|_| IngestError::Internal("panic while accepting submission".into()))??;

        tracing::debug!(user_id = %entry.user_id, uri = %entry.uri, value = %entry.value, "Metric accepted");

        // Persistence is at-most-once and never changes the client's answer.
        match self.state.log.append(entry).await {
            Ok(()) => {}
            Err(LogWriterError::Closed) => {
                tracing::warn!("Log writer closed, metric not persisted");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to queue metric for persistence"),
        }
        Ok(())
    }

    /// Parse, authenticate and cache. Nothing is mutated unless every check passes.
    fn accept(&self, line: &str) -> Result<LogEntry, IngestError> {
        let submission = protocol::parse(line)?;
        let user_id = self.state.auth.authenticate(&submission)?;

        self.state
            .cache
            .update(&submission.uri, submission.value.clone(), submission.ts);

        Ok(LogEntry {
            ts: submission.ts,
            uri: submission.uri,
            value: submission.value,
            user_id,
        })
    }
}
