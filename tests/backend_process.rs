//! Drives the real `postdesk-backend` binary over stdio.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use postdesk::bridge::lifecycle::{spawn_backend, BackendProcess};
use postdesk::bridge::{Bridge, BridgeError, DeadlineTransport};
use postdesk::commands::{self, CallOutcome, Post};
use postdesk::config::BackendConfig;

fn backend_config(env: &[(&str, &str)]) -> BackendConfig {
    BackendConfig {
        command: env!("CARGO_BIN_EXE_postdesk-backend").to_string(),
        args: Vec::new(),
        env: env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        cwd: None,
    }
}

fn seed_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(br#"[{"id": 1, "title": "Hello", "text": "World"}]"#)
        .unwrap();
    file
}

async fn start(env: &[(&str, &str)]) -> (BackendProcess, Bridge) {
    let backend = spawn_backend("postdesk-backend", &backend_config(env))
        .await
        .expect("backend should start");
    let transport = DeadlineTransport::new(backend.transport(), Some(Duration::from_secs(10)));
    let bridge = Bridge::from_transport(transport);
    (backend, bridge)
}

#[tokio::test]
async fn test_handshake_lists_operations() {
    let (mut backend, _bridge) = start(&[]).await;

    assert_eq!(backend.info.name, "postdesk-backend");
    for op in [
        "greet",
        "get_all_posts",
        "create_post",
        "update_post",
        "delete_post",
        "check_redis_connection",
    ] {
        assert!(
            backend.info.operations.iter().any(|o| o == op),
            "missing operation {op}"
        );
    }
    assert!(backend.is_alive());
    backend.shutdown().await;
}

#[tokio::test]
async fn test_get_all_posts_from_seed() {
    let seed = seed_file();
    let seed_path = seed.path().to_string_lossy().into_owned();
    let (backend, bridge) = start(&[("POSTDESK_SEED", &seed_path)]).await;

    let posts = commands::get_all_posts(&bridge).await.data().unwrap();
    assert_eq!(
        posts,
        vec![Post {
            id: 1,
            title: "Hello".into(),
            text: "World".into()
        }]
    );

    backend.shutdown().await;
}

#[tokio::test]
async fn test_cache_status_both_ways() {
    let (online, bridge) = start(&[]).await;
    assert_eq!(
        commands::check_redis_connection(&bridge).await.data().as_deref(),
        Some("Redis is connected")
    );
    online.shutdown().await;

    let (offline, bridge) = start(&[("POSTDESK_CACHE_OFFLINE", "1")]).await;
    match commands::check_redis_connection(&bridge).await {
        CallOutcome::Rejected { message } => {
            assert_eq!(message.as_deref(), Some("connection refused"))
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    offline.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_greetings_settle_independently() {
    let (backend, bridge) = start(&[]).await;

    let (a, b) = tokio::join!(commands::greet(&bridge, "A"), commands::greet(&bridge, "B"));
    assert_eq!(a.unwrap(), "Hello, A!");
    assert_eq!(b.unwrap(), "Hello, B!");

    backend.shutdown().await;
}

#[tokio::test]
async fn test_unknown_operation_rejects() {
    let (backend, bridge) = start(&[]).await;

    let result = bridge
        .invoke::<serde_json::Value>("nonexistent_op", serde_json::json!({}))
        .await;
    assert!(matches!(result, Err(BridgeError::UnknownOperation { .. })));

    backend.shutdown().await;
}

#[tokio::test]
async fn test_calls_after_shutdown_reject() {
    let (backend, bridge) = start(&[]).await;
    let transport = backend.transport();

    backend.shutdown().await;

    // The reader task observes EOF shortly after the process exits.
    for _ in 0..50 {
        if transport.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let err = commands::greet(&bridge, "late").await.unwrap_err();
    assert!(
        matches!(
            err,
            BridgeError::BackendExited { .. } | BridgeError::TransportError { .. }
        ),
        "unexpected error: {err:?}"
    );
}
