//! Discord REST client tests against a mock HTTP server

use sdk::errors::{EngineError, MiddagErrorExt};
use sdk::transport::ChatTransport;
use sdk::types::{ChannelId, MessageId, ParticipantId};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing},
    Mock, MockServer, ResponseTemplate,
};

use middag_engine::bot::DiscordClient;
use middag_engine::secrets::SecretString;

const TOKEN: &str = "test-token";

fn client(server: &MockServer) -> DiscordClient {
    DiscordClient::new(server.uri(), SecretString::new(TOKEN))
}

fn user(id: &str, username: &str) -> Value {
    json!({ "id": id, "username": username, "global_name": null })
}

#[tokio::test]
async fn test_send_message_posts_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/100/messages"))
        .and(header("Authorization", "Bot test-token"))
        .and(body_partial_json(json!({
            "content": "@everyone hei",
            "allowed_mentions": { "parse": ["everyone", "users"] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "555",
            "channel_id": "100",
            "content": "@everyone hei"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let posted = client(&server)
        .send_message(&ChannelId::new("100"), "@everyone hei")
        .await
        .unwrap();

    assert_eq!(posted.id, MessageId::new("555"));
    assert_eq!(posted.channel_id, ChannelId::new("100"));
}

#[tokio::test]
async fn test_add_reaction_encodes_emoji() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/channels/100/messages/555/reactions/%F0%9F%91%8D/@me"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .add_reaction(&ChannelId::new("100"), &MessageId::new("555"), "👍")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reaction_users_are_paginated() {
    let server = MockServer::start().await;
    let reactions = "/channels/100/messages/555/reactions/%F0%9F%91%8D";

    let first_page: Vec<Value> = (1..=100)
        .map(|i| user(&i.to_string(), &format!("user{}", i)))
        .collect();

    Mock::given(method("GET"))
        .and(path(reactions))
        .and(query_param("limit", "100"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(reactions))
        .and(query_param("after", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "101", "username": "kari", "global_name": "Kari N." },
            { "id": "999", "username": "middag", "bot": true }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let users = client(&server)
        .fetch_reaction_users(&ChannelId::new("100"), &MessageId::new("555"), "👍")
        .await
        .unwrap();

    assert_eq!(users.len(), 102);
    assert_eq!(users[0].id, ParticipantId::new("1"));
    assert_eq!(users[100].display_name, "Kari N.");
    assert!(users[101].is_bot);
}

#[tokio::test]
async fn test_fetch_user_falls_back_to_username() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user("42", "ola")))
        .mount(&server)
        .await;

    let participant = client(&server)
        .fetch_user(&ParticipantId::new("42"))
        .await
        .unwrap();

    assert_eq!(participant.display_name, "ola");
    assert!(!participant.is_bot);
}

#[tokio::test]
async fn test_rate_limit_is_recoverable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/100/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("You are being rate limited."))
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message(&ChannelId::new("100"), "hei")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Transport { status: 429, .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_unauthorized_is_fatal_and_scrubbed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("401: Unauthorized (Bot abcdefghijklmnopqrstuvwxyz)"),
        )
        .mount(&server)
        .await;

    let err = client(&server).current_user().await.unwrap_err();

    assert!(matches!(err, EngineError::Transport { status: 401, .. }));
    assert!(!err.is_recoverable());
    assert!(!err.to_string().contains("abcdefghijklmnopqrstuvwxyz"));
    assert!(err.to_string().contains("[REDACTED]"));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/100/messages/555"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_message(&ChannelId::new("100"), &MessageId::new("555"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Decode(_)));
    assert!(!err.is_recoverable());
}
