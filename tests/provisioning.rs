use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use shaddy_bot::auth::AccessGate;
use shaddy_bot::config::Config;
use shaddy_bot::keys::conversation::{ConversationEvent, Provisioner};
use shaddy_bot::keys::models::{CipherSuite, NewCredential};
use shaddy_bot::keys::store::{CredentialStore, FileStore};
use shaddy_bot::outline::OutlineClient;

const ADMIN: i64 = 99;

fn test_config(base_url: &str, database_path: &Path) -> Config {
    Config {
        bot_token: "test-token".into(),
        admin_id: ADMIN,
        database_path: database_path.to_path_buf(),
        outline_api_url: base_url.trim_end_matches('/').to_string(),
        outline_cert_sha256: None,
        request_timeout: Duration::from_secs(5),
    }
}

fn build(server: &MockServer, dir: &tempfile::TempDir) -> (Arc<FileStore>, Provisioner) {
    let config = test_config(&server.base_url(), &dir.path().join("database.json"));
    let store = Arc::new(FileStore::new(&config.database_path));
    let outline = OutlineClient::new(&config).unwrap();
    let gate = AccessGate::new(ADMIN);
    let provisioner = Provisioner::new(store.clone(), outline, gate);
    (store, provisioner)
}

#[tokio::test]
async fn operator_provisions_for_a_named_target() {
    let server = MockServer::start_async().await;
    let issue_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/access-keys")
            .json_body(json!({ "name": "laptop", "method": "aes-256-gcm" }));
        then.status(201).json_body(json!({
            "id": "0",
            "name": "laptop",
            "method": "aes-256-gcm",
            "accessUrl": "secret-abc",
        }));
    });
    let dir = tempfile::tempdir().unwrap();
    let (store, provisioner) = build(&server, &dir);

    provisioner.handle(ADMIN, ConversationEvent::StartFor).await;
    provisioner
        .handle(ADMIN, ConversationEvent::Text("42".into()))
        .await;
    provisioner
        .handle(ADMIN, ConversationEvent::Text("laptop".into()))
        .await;
    let confirmation = provisioner
        .handle(
            ADMIN,
            ConversationEvent::Choice("select_cipher:aes-256-gcm".into()),
        )
        .await;

    issue_mock.assert();
    assert!(confirmation.text.contains("secret-abc"));
    assert!(confirmation.html);

    let records = store.list_all().await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.internal_id, 1);
    assert_eq!(record.owner_identity, 42);
    assert_eq!(record.label, "laptop");
    assert_eq!(record.cipher_suite, CipherSuite::Aes256Gcm);
    assert_eq!(record.credential_material, "secret-abc");
    assert!(!provisioner.in_conversation(ADMIN));
}

#[tokio::test]
async fn existing_owner_is_rejected_without_a_remote_call() {
    let server = MockServer::start_async().await;
    let issue_mock = server.mock(|when, then| {
        when.method(POST).path("/access-keys");
        then.status(201).json_body(json!({ "accessUrl": "unused" }));
    });
    let dir = tempfile::tempdir().unwrap();
    let (store, provisioner) = build(&server, &dir);

    store
        .insert(
            NewCredential {
                owner_identity: 7,
                label: "existing".into(),
                cipher_suite: CipherSuite::default(),
                credential_material: "ss://existing".into(),
            },
            true,
        )
        .await
        .unwrap();

    let reply = provisioner.handle(7, ConversationEvent::Start).await;
    assert!(reply.text.contains("already have"));
    issue_mock.assert_hits(0);
    assert_eq!(store.list_all().await.unwrap().len(), 1);
    assert!(!provisioner.in_conversation(7));
}

#[tokio::test]
async fn remote_failure_leaves_the_store_unchanged() {
    let server = MockServer::start_async().await;
    let issue_mock = server.mock(|when, then| {
        when.method(POST).path("/access-keys");
        then.status(503);
    });
    let dir = tempfile::tempdir().unwrap();
    let (store, provisioner) = build(&server, &dir);

    provisioner.handle(7, ConversationEvent::Start).await;
    provisioner
        .handle(7, ConversationEvent::Text("phone".into()))
        .await;
    let reply = provisioner
        .handle(7, ConversationEvent::Choice("select_cipher:default".into()))
        .await;

    issue_mock.assert();
    assert!(reply.text.contains("Error creating key"));
    assert!(store.list_all().await.unwrap().is_empty());
    // The failure resets to idle; a fresh flow may start from scratch.
    assert!(!provisioner.in_conversation(7));
}

#[tokio::test]
async fn invalid_cipher_token_keeps_the_flow_open() {
    let server = MockServer::start_async().await;
    let issue_mock = server.mock(|when, then| {
        when.method(POST).path("/access-keys");
        then.status(201).json_body(json!({ "accessUrl": "ss://later" }));
    });
    let dir = tempfile::tempdir().unwrap();
    let (store, provisioner) = build(&server, &dir);

    provisioner.handle(7, ConversationEvent::Start).await;
    provisioner
        .handle(7, ConversationEvent::Text("tablet".into()))
        .await;
    let reprompt = provisioner
        .handle(7, ConversationEvent::Choice("select_cipher:rot13".into()))
        .await;
    assert!(reprompt.text.contains("Choose encryption"));
    issue_mock.assert_hits(0);
    assert!(store.list_all().await.unwrap().is_empty());
    assert!(provisioner.in_conversation(7));

    // A valid choice afterwards still completes the same flow.
    provisioner
        .handle(
            7,
            ConversationEvent::Choice("select_cipher:chacha20-ietf-poly1305".into()),
        )
        .await;
    issue_mock.assert();
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_clears_all_conversation_state() {
    let server = MockServer::start_async().await;
    let issue_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/access-keys")
            .json_body(json!({ "name": "fresh", "method": "chacha20-ietf-poly1305" }));
        then.status(201).json_body(json!({ "accessUrl": "ss://fresh" }));
    });
    let dir = tempfile::tempdir().unwrap();
    let (store, provisioner) = build(&server, &dir);

    provisioner.handle(7, ConversationEvent::Start).await;
    provisioner
        .handle(7, ConversationEvent::Text("stale-label".into()))
        .await;
    let cancelled = provisioner.handle(7, ConversationEvent::Cancel).await;
    assert!(cancelled.text.contains("cancelled"));
    assert!(!provisioner.in_conversation(7));

    // The next flow must not see the stale label: the issued request body is
    // matched against the fresh one only.
    provisioner.handle(7, ConversationEvent::Start).await;
    provisioner
        .handle(7, ConversationEvent::Text("fresh".into()))
        .await;
    provisioner
        .handle(7, ConversationEvent::Choice("select_cipher:default".into()))
        .await;

    issue_mock.assert();
    let records = store.list_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "fresh");
    assert_eq!(records[0].cipher_suite, CipherSuite::Chacha20IetfPoly1305);
}

#[tokio::test]
async fn internal_ids_stay_monotonic_across_flows() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/access-keys");
        then.status(201).json_body(json!({ "accessUrl": "ss://key" }));
    });
    let dir = tempfile::tempdir().unwrap();
    let (store, provisioner) = build(&server, &dir);

    for target in ["11", "22", "33"] {
        provisioner.handle(ADMIN, ConversationEvent::StartFor).await;
        provisioner
            .handle(ADMIN, ConversationEvent::Text(target.into()))
            .await;
        provisioner
            .handle(ADMIN, ConversationEvent::Text(format!("key-{target}")))
            .await;
        provisioner
            .handle(ADMIN, ConversationEvent::Choice("select_cipher:default".into()))
            .await;
    }

    let ids: Vec<u64> = store
        .list_all()
        .await
        .unwrap()
        .iter()
        .map(|record| record.internal_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn malformed_issue_response_is_a_remote_failure() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/access-keys");
        then.status(201).json_body(json!({ "unexpected": true }));
    });
    let dir = tempfile::tempdir().unwrap();
    let (store, provisioner) = build(&server, &dir);

    provisioner.handle(7, ConversationEvent::Start).await;
    provisioner
        .handle(7, ConversationEvent::Text("phone".into()))
        .await;
    let reply = provisioner
        .handle(7, ConversationEvent::Choice("select_cipher:default".into()))
        .await;

    assert!(reply.text.contains("Error creating key"));
    assert!(store.list_all().await.unwrap().is_empty());
}
