//! Push client speaking the line protocol.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::AgentConfig;
use crate::net::tls::{self, TlsError};
use crate::protocol::{MetricMessage, Response};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid server address '{0}', expected host:port")]
    Address(String),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("no CA certificate configured and plaintext not allowed")]
    NoTrustAnchor,

    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("server closed the connection")]
    Closed,
}

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// One connection to the ingestion server.
pub struct AgentClient {
    stream: BufReader<Box<dyn Stream>>,
}

impl AgentClient {
    /// Connect using TLS (trusting `ca_cert_path`) or plaintext when allowed.
    pub async fn connect(config: &AgentConfig) -> Result<Self, AgentError> {
        let address = &config.server_address;
        let (host, _) = address
            .rsplit_once(':')
            .ok_or_else(|| AgentError::Address(address.clone()))?;

        let tcp = TcpStream::connect(address)
            .await
            .map_err(|source| AgentError::Connect {
                address: address.clone(),
                source,
            })?;
        let _ = tcp.set_nodelay(true);

        let stream: Box<dyn Stream> = match (&config.ca_cert_path, config.allow_plaintext) {
            (Some(ca), _) => {
                let connector = tls::load_connector(ca)?;
                let name = tls::server_name(config.server_name.as_deref().unwrap_or(host))?;
                Box::new(connector.connect(name, tcp).await?)
            }
            (None, true) => Box::new(tcp),
            (None, false) => return Err(AgentError::NoTrustAnchor),
        };

        tracing::debug!(address = %address, tls = config.ca_cert_path.is_some(), "Connected to server");
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: Box<dyn Stream>) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Send one line and wait for its response.
    pub async fn send_line(&mut self, line: &str) -> Result<Response, AgentError> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            stream.write_all(b"\n").await?;
        }
        stream.flush().await?;

        let mut response = String::new();
        if self.stream.read_line(&mut response).await? == 0 {
            return Err(AgentError::Closed);
        }
        Ok(Response::from_line(&response))
    }

    /// Sign and send one metric.
    pub async fn send_metric(&mut self, message: &MetricMessage, secret: &str) -> Result<Response, AgentError> {
        self.send_line(&message.to_signed_line(secret)).await
    }

    pub async fn close(mut self) {
        let _ = self.stream.get_mut().shutdown().await;
    }
}
