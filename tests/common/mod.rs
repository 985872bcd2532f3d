//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use telemetry_server::config::{ServerConfig, TlsConfig};
use telemetry_server::protocol::encode_signed;
use telemetry_server::storage::LogEntry;
use telemetry_server::{IngestServer, RunningServer, Shutdown};

pub const TOKEN: &str = "T1";
pub const SECRET: &str = "s1";
pub const EXPIRED_TOKEN: &str = "OLD";
pub const EXPIRED_SECRET: &str = "s2";
pub const ADMIN_KEY: &str = "dashboard-key";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Registry with one live token for alice and one expired token for bob.
pub fn write_registry(dir: &Path) -> PathBuf {
    let path = dir.join("token_registry.json");
    let registry = json!({
        TOKEN: {
            "user_id": "alice",
            "secret": SECRET,
            "issued_at": "2020-01-01T00:00:00Z",
            "expires_at": "2099-01-01T00:00:00Z"
        },
        EXPIRED_TOKEN: {
            "user_id": "bob",
            "secret": EXPIRED_SECRET,
            "issued_at": "2020-01-01T00:00:00Z",
            "expires_at": "2021-01-01T00:00:00Z"
        }
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&registry).unwrap()).unwrap();
    path
}

/// Plaintext config on an ephemeral port with everything under `dir`.
pub fn test_config(dir: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.allow_plaintext = true;
    config.auth.registry_path = write_registry(dir);
    config.auth.watch = false;
    config.log_writer.directory = dir.join("logs");
    config.shutdown.grace_period_secs = 1;
    config
}

pub fn tls_config(dir: &Path) -> ServerConfig {
    let mut config = test_config(dir);
    config.listener.allow_plaintext = false;
    config.listener.tls = Some(TlsConfig {
        cert_path: fixture("server.pem"),
        key_path: fixture("server.key"),
    });
    config
}

pub struct TestServer {
    pub server: RunningServer,
    pub shutdown: Shutdown,
    pub dir: TempDir,
}

impl TestServer {
    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    /// Trigger shutdown and wait for the whole sequence.
    pub async fn stop(self) -> TempDir {
        self.shutdown.trigger();
        self.server.wait().await.unwrap();
        self.dir
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(tweak: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    tweak(&mut config);

    let shutdown = Shutdown::new();
    let server = IngestServer::new(config).start(shutdown.clone()).await.unwrap();
    TestServer { server, shutdown, dir }
}

/// Line client over plaintext TCP.
pub struct LineClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (read, write) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Next response line without its newline, or `None` on EOF.
    pub async fn read_response(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end().to_string()),
        }
    }

    pub async fn send(&mut self, line: &str) -> String {
        self.write_raw(line.as_bytes()).await;
        if !line.ends_with('\n') {
            self.write_raw(b"\n").await;
        }
        self.read_response().await.expect("server closed the connection")
    }
}

pub fn metric_fields(uri: &str, ts: &str, value: Value, token: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("type".into(), json!("metric"));
    fields.insert("uri".into(), json!(uri));
    fields.insert("ts".into(), json!(ts));
    fields.insert("value".into(), value);
    fields.insert("token".into(), json!(token));
    fields
}

/// A correctly signed line for the live token.
pub fn signed_metric(uri: &str, ts: &str, value: Value) -> String {
    encode_signed(metric_fields(uri, ts, value, TOKEN), SECRET)
}

/// Replace the signature of a signed line.
pub fn with_signature(line: &str, signature: &str) -> String {
    let mut message: Map<String, Value> = serde_json::from_str(line.trim_end()).unwrap();
    message.insert("signature".into(), json!(signature));
    serde_json::to_string(&message).unwrap()
}

/// Every entry in every log file under `dir`, checking that no line is partial.
pub fn read_log_entries(dir: &Path) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let Ok(files) = std::fs::read_dir(dir) else {
        return entries;
    };
    for file in files {
        let content = std::fs::read_to_string(file.unwrap().path()).unwrap();
        assert!(content.is_empty() || content.ends_with('\n'), "partial line in log");
        for line in content.lines() {
            entries.push(serde_json::from_str(line).unwrap());
        }
    }
    entries
}
