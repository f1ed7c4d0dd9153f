//! Tests for the REST gateway against a local mock HTTP server:
//! authentication, decoding, rate-limit classification, and the wire
//! shape of each call.

use std::path::PathBuf;
use std::time::Duration;

use mockito::Matcher;
use slackport::discord::gateway::{
    DiscordGateway, FileUpload, GatewayError, MessagePayload, SentMessage,
};
use slackport::discord::RestGateway;
use slackport::model::{Link, ParsedMessage};

fn gateway_for(server: &mockito::ServerGuard) -> RestGateway {
    RestGateway::new("test-token")
        .unwrap()
        .with_base_url(server.url())
}

#[tokio::test]
async fn test_identify_decodes_bot_identity_and_sends_auth() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/users/@me")
        .match_header("authorization", "Bot test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "42", "username": "importer"}"#)
        .create_async()
        .await;

    let identity = gateway_for(&server).identify().await.unwrap();
    mock.assert_async().await;
    assert_eq!(identity.id, "42");
    assert_eq!(identity.username, "importer");
}

#[tokio::test]
async fn test_rate_limit_header_is_classified() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/users/@me")
        .with_status(429)
        .with_header("Retry-After", "3")
        .create_async()
        .await;

    let err = gateway_for(&server).identify().await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn test_rate_limit_body_is_classified() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/users/@me")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "You are being rate limited.", "retry_after": 2.5}"#)
        .create_async()
        .await;

    let err = gateway_for(&server).identify().await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs_f64(2.5)));
}

#[tokio::test]
async fn test_server_error_becomes_status_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/users/@me/guilds")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let err = gateway_for(&server).guilds().await.unwrap_err();
    match err {
        GatewayError::Status { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("internal error"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert!(!matches!(
        gateway_for(&server).guilds().await.unwrap_err(),
        GatewayError::RateLimited { .. }
    ));
}

#[tokio::test]
async fn test_text_channels_filters_non_text_kinds() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/guilds/G1/channels")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
              {"id": "C1", "name": "general", "type": 0},
              {"id": "C2", "name": "lounge", "type": 2},
              {"id": "C3", "name": "random", "type": 0}
            ]"#,
        )
        .create_async()
        .await;

    let channels = gateway_for(&server).text_channels("G1").await.unwrap();
    let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["general", "random"]);
}

#[tokio::test]
async fn test_send_message_posts_content_and_embeds() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/channels/C1/messages")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "content": "hello",
            "embeds": [{"title": "A link", "url": "https://example.com"}]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "M1", "channel_id": "C1"}"#)
        .create_async()
        .await;

    let mut message = ParsedMessage::new("hello");
    message.push_link(Link {
        title: Some("A link".to_string()),
        title_link: Some("https://example.com".to_string()),
        ..Link::default()
    });
    let payload = MessagePayload::from_message(&message);

    let sent = gateway_for(&server)
        .send_message("C1", &payload)
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(sent.id, "M1");
    assert_eq!(sent.channel_id, "C1");
}

#[tokio::test]
async fn test_create_thread_uses_message_anchor_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/channels/C1/messages/M1/threads")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "name": "thread1000.000000"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "T1", "name": "thread1000.000000"}"#)
        .create_async()
        .await;

    let sent = SentMessage {
        id: "M1".to_string(),
        channel_id: "C1".to_string(),
    };
    let thread = gateway_for(&server)
        .create_thread(&sent, "thread1000.000000")
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(thread.id, "T1");
}

#[tokio::test]
async fn test_create_text_channel_posts_name_and_type() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/guilds/G1/channels")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "name": "imported",
            "type": 0
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "C9", "name": "imported", "type": 0}"#)
        .create_async()
        .await;

    let channel = gateway_for(&server)
        .create_text_channel("G1", "imported")
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(channel.id, "C9");
    assert_eq!(channel.name, "imported");
}

#[tokio::test]
async fn test_attach_files_patches_message_with_multipart() {
    let dir = tempfile::tempdir().unwrap();
    let file_path: PathBuf = dir.path().join("F1");
    std::fs::write(&file_path, b"file body").unwrap();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", "/channels/C1/messages/M1")
        .match_header(
            "content-type",
            Matcher::Regex("multipart/form-data.*".to_string()),
        )
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let sent = SentMessage {
        id: "M1".to_string(),
        channel_id: "C1".to_string(),
    };
    let uploads = vec![FileUpload {
        path: file_path,
        filename: "doc.txt".to_string(),
    }];

    gateway_for(&server)
        .attach_files(&sent, &uploads)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_upload_file_is_an_io_error() {
    let server = mockito::Server::new_async().await;
    let sent = SentMessage {
        id: "M1".to_string(),
        channel_id: "C1".to_string(),
    };
    let uploads = vec![FileUpload {
        path: PathBuf::from("/nonexistent/F1"),
        filename: "gone.txt".to_string(),
    }];

    let err = gateway_for(&server)
        .attach_files(&sent, &uploads)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Io(_)));
}
