//! End-to-end tests over real sockets.

mod common;

use std::time::Duration;

use serde_json::json;

use common::*;
use telemetry_server::agent::{Agent, AgentClient, CollectorRegistry, Sample};
use telemetry_server::config::AgentConfig;
use telemetry_server::protocol::Response;

#[tokio::test]
async fn accepted_metric_is_cached_and_logged() {
    let server = start_server().await;
    let mut client = LineClient::connect(server.addr()).await;

    let line = signed_metric("/agent/alice/system.cpu.core0", "2025-01-01T00:00:00Z", json!(42.5));
    assert_eq!(client.send(&line).await, "ACK");

    let snapshot = server.server.state().cache.snapshot();
    assert_eq!(
        serde_json::to_value(&snapshot).unwrap(),
        json!({"/agent/alice/system.cpu.core0": {"value": 42.5, "timestamp": "2025-01-01T00:00:00Z"}})
    );

    drop(client);
    let log_dir = server.log_dir();
    let _dir = server.stop().await;

    let entries = read_log_entries(&log_dir);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].uri, "/agent/alice/system.cpu.core0");
    assert_eq!(entries[0].user_id, "alice");
    assert_eq!(entries[0].value.as_f64(), Some(42.5));
}

#[tokio::test]
async fn bad_signature_changes_nothing() {
    let server = start_server().await;
    let mut client = LineClient::connect(server.addr()).await;

    let line = signed_metric("/agent/alice/cpu", "2025-01-01T00:00:00Z", json!(1));
    assert_eq!(client.send(&with_signature(&line, "deadbeef")).await, "ERROR: Invalid signature");
    assert!(server.server.state().cache.is_empty());

    drop(client);
    let log_dir = server.log_dir();
    let _dir = server.stop().await;
    assert!(read_log_entries(&log_dir).is_empty());
}

#[tokio::test]
async fn any_single_character_change_is_rejected() {
    let server = start_server().await;
    let mut client = LineClient::connect(server.addr()).await;

    let line = signed_metric("/agent/alice/cpu", "2025-01-01T00:00:00Z", json!(3.25));
    let message: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line.trim_end()).unwrap();
    let signature = message["signature"].as_str().unwrap().to_string();

    for i in 0..signature.len() {
        let mut mutated: Vec<char> = signature.chars().collect();
        mutated[i] = if mutated[i] == '0' { '1' } else { '0' };
        let mutated: String = mutated.into_iter().collect();
        assert_eq!(
            client.send(&with_signature(&line, &mutated)).await,
            "ERROR: Invalid signature",
            "position {}",
            i
        );
    }
    assert!(server.server.state().cache.is_empty());

    // The untouched line is still good on the same connection.
    assert_eq!(client.send(&line).await, "ACK");
    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn expired_token_is_rejected_even_when_signed_correctly() {
    let server = start_server().await;
    let mut client = LineClient::connect(server.addr()).await;

    let line = telemetry_server::protocol::encode_signed(
        metric_fields("/agent/bob/cpu", "2025-01-01T00:00:00Z", json!(1.0), EXPIRED_TOKEN),
        EXPIRED_SECRET,
    );
    assert_eq!(client.send(&line).await, "ERROR: Invalid or expired token");

    let unknown = telemetry_server::protocol::encode_signed(
        metric_fields("/agent/eve/cpu", "2025-01-01T00:00:00Z", json!(1.0), "nope"),
        "whatever",
    );
    assert_eq!(client.send(&unknown).await, "ERROR: Invalid or expired token");

    let missing = signed_metric("/agent/alice/cpu", "2025-01-01T00:00:00Z", json!(1.0));
    assert_eq!(
        client.send(&with_signature(&missing, "")).await,
        "ERROR: Missing token or signature"
    );

    assert!(server.server.state().cache.is_empty());
    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn malformed_lines_keep_the_connection_open() {
    let server = start_server().await;
    let mut client = LineClient::connect(server.addr()).await;

    assert!(client.send("this is not json").await.starts_with("ERROR: Invalid JSON message"));
    assert_eq!(
        client.send(r#"{"uri":"/a","ts":"2025-01-01T00:00:00Z","token":"T1","signature":"x"}"#).await,
        "ERROR: Missing required field: 'value'"
    );
    assert_eq!(
        client
            .send(r#"{"uri":"/a","ts":"2025-01-01T00:00:00Z","value":"high","token":"T1","signature":"x"}"#)
            .await,
        "ERROR: Invalid type for field 'value': expected int or float"
    );
    assert_eq!(
        client
            .send(r#"{"uri":"/a","ts":"yesterday","value":1,"token":"T1","signature":"x"}"#)
            .await,
        "ERROR: Invalid timestamp format for 'ts' field: yesterday"
    );

    let good = signed_metric("/agent/alice/load", "2025-01-01T00:00:00", json!(7));
    assert_eq!(client.send(&good).await, "ACK");
    assert_eq!(
        server.server.state().cache.get("/agent/alice/load").unwrap().value,
        serde_json::Number::from(7)
    );

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn oversized_line_closes_only_that_connection() {
    let server = start_server_with(|config| config.connection.max_line_bytes = 256).await;
    let mut noisy = LineClient::connect(server.addr()).await;
    let mut quiet = LineClient::connect(server.addr()).await;

    noisy.write_raw(&vec![b'x'; 1024]).await;
    noisy.write_raw(b"\n").await;
    assert_eq!(noisy.read_response().await.unwrap(), "ERROR: Line exceeds 256 bytes");
    assert_eq!(noisy.read_response().await, None);

    let line = signed_metric("/agent/alice/cpu", "2025-01-01T00:00:00Z", json!(1));
    assert_eq!(quiet.send(&line).await, "ACK");

    drop(quiet);
    server.stop().await;
}

#[tokio::test]
async fn shutdown_flushes_every_accepted_metric() {
    let server = start_server().await;
    let mut client = LineClient::connect(server.addr()).await;

    for i in 0..100 {
        let line = signed_metric(&format!("/agent/alice/m{}", i), "2025-01-01T00:00:00Z", json!(i));
        assert_eq!(client.send(&line).await, "ACK");
    }

    let log_dir = server.log_dir();
    let _dir = server.stop().await;

    // The idle connection was closed by the shutdown.
    assert_eq!(client.read_response().await, None);

    let entries = read_log_entries(&log_dir);
    assert_eq!(entries.len(), 100);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.uri, format!("/agent/alice/m{}", i));
    }
}

#[tokio::test]
async fn connections_are_independent() {
    let server = start_server().await;

    let mut tasks = Vec::new();
    for c in 0..8 {
        let addr = server.addr();
        tasks.push(tokio::spawn(async move {
            let mut client = LineClient::connect(addr).await;
            for i in 0..20 {
                let line = signed_metric(&format!("/agent/alice/c{}", c), "2025-01-01T00:00:00Z", json!(i));
                assert_eq!(client.send(&line).await, "ACK");
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = server.server.state().cache.snapshot();
    assert_eq!(snapshot.len(), 8);
    // Per-connection order is preserved, so the last write wins.
    assert!(snapshot.values().all(|entry| entry.value == serde_json::Number::from(19)));

    server.stop().await;
}

#[tokio::test]
async fn agent_pushes_over_tls() {
    let dir = tempfile::tempdir().unwrap();
    let shutdown = telemetry_server::Shutdown::new();
    let server = telemetry_server::IngestServer::new(tls_config(dir.path()))
        .start(shutdown.clone())
        .await
        .unwrap();

    let config = AgentConfig {
        server_address: format!("localhost:{}", server.local_addr().port()),
        ca_cert_path: Some(fixture("ca.pem")),
        user_id: "alice".into(),
        token: TOKEN.into(),
        secret: SECRET.into(),
        ..AgentConfig::default()
    };

    let mut client = AgentClient::connect(&config).await.unwrap();
    let line = signed_metric("/agent/alice/tls", "2025-01-01T00:00:00Z", json!(0.5));
    assert_eq!(client.send_line(&line).await.unwrap(), Response::Ack);
    client.close().await;

    struct Fixed;
    impl telemetry_server::agent::Collector for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn collect(&self) -> std::io::Result<Vec<Sample>> {
            Ok(vec![("system.load.1m".into(), 0.25), ("system.load.5m".into(), 0.5)])
        }
    }

    let agent = Agent::new(config, CollectorRegistry::new().with(Fixed));
    let report = agent.push_once().await.unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 0);

    let snapshot = server.state().cache.snapshot();
    assert!(snapshot.contains_key("/agent/alice/tls"));
    assert_eq!(snapshot["/agent/alice/system.load.5m"].value.as_f64(), Some(0.5));

    shutdown.trigger();
    server.wait().await.unwrap();
}

#[tokio::test]
async fn plaintext_client_cannot_talk_to_tls_listener() {
    let dir = tempfile::tempdir().unwrap();
    let shutdown = telemetry_server::Shutdown::new();
    let mut config = tls_config(dir.path());
    config.connection.handshake_timeout_secs = 1;
    let server = telemetry_server::IngestServer::new(config)
        .start(shutdown.clone())
        .await
        .unwrap();

    let mut client = LineClient::connect(server.local_addr()).await;
    client
        .write_raw(signed_metric("/agent/alice/cpu", "2025-01-01T00:00:00Z", json!(1)).as_bytes())
        .await;
    let response = tokio::time::timeout(Duration::from_secs(5), client.read_response())
        .await
        .unwrap();
    assert_ne!(response.as_deref(), Some("ACK"));
    assert!(server.state().cache.is_empty());

    shutdown.trigger();
    server.wait().await.unwrap();
}

#[tokio::test]
async fn missing_registry_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.auth.registry_path = dir.path().join("absent.json");

    let result = telemetry_server::IngestServer::new(config)
        .start(telemetry_server::Shutdown::new())
        .await;
    assert!(matches!(result, Err(telemetry_server::ServerError::Registry(_))));
}
