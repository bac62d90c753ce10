use podpush::services::push::{OneSignalProvider, PushMessage, PushProvider, PushProviderConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> PushProviderConfig {
    PushProviderConfig::OneSignal {
        app_id: "app-123".to_string(),
        api_key: "rest-key".to_string(),
    }
}

async fn ready_provider(server: &MockServer) -> OneSignalProvider {
    let mut provider = OneSignalProvider::with_api_base(reqwest::Client::new(), server.uri());
    provider.initialize(&config()).await.unwrap();
    provider
}

fn players(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("00000000-0000-4000-8000-00000000000{i}"))
        .collect()
}

#[tokio::test]
async fn test_recipients_shortfall_is_reported_as_failures() {
    let server = MockServer::start().await;
    let tokens = players(5);
    Mock::given(method("POST"))
        .and(path("/notifications"))
        .and(header("authorization", "Basic rest-key"))
        .and(body_partial_json(json!({
            "app_id": "app-123",
            "headings": { "en": "New episode" },
            "include_player_ids": tokens,
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "notif-1", "recipients": 3 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = ready_provider(&server).await;
    let result = provider
        .send_to_devices(&tokens, &PushMessage::new("New episode", "Episode 42"))
        .await;

    assert!(result.success);
    assert_eq!(result.message_id.as_deref(), Some("notif-1"));
    assert_eq!(result.success_count, 3);
    assert_eq!(result.failure_count, 2);
    // OneSignal does not say which players were missed
    assert!(result.failed_tokens.is_empty());
}

#[tokio::test]
async fn test_non_2xx_is_a_failed_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "errors": ["Invalid app_id"] })),
        )
        .mount(&server)
        .await;

    let provider = ready_provider(&server).await;
    let tokens = players(2);
    let result = provider
        .send_to_devices(&tokens, &PushMessage::new("t", "b"))
        .await;

    assert!(!result.success);
    assert_eq!(result.failure_count, 2);
    let error = result.error.unwrap();
    assert!(error.contains("400"), "unexpected error: {error}");
    assert!(error.contains("Invalid app_id"));
}

#[tokio::test]
async fn test_malformed_response_is_a_failed_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let provider = ready_provider(&server).await;
    let result = provider
        .send_to_devices(&players(1), &PushMessage::new("t", "b"))
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Malformed JSON"));
}

#[tokio::test]
async fn test_segment_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notifications"))
        .and(body_partial_json(json!({ "included_segments": ["Subscribed Users"] })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "notif-2", "recipients": 1200 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = ready_provider(&server).await;
    let result = provider
        .send_to_topic("Subscribed Users", &PushMessage::new("t", "b"))
        .await;

    assert!(result.success);
    assert_eq!(result.success_count, 1200);
    assert_eq!(result.failure_count, 0);
}

#[tokio::test]
async fn test_not_ready_provider_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = OneSignalProvider::with_api_base(reqwest::Client::new(), server.uri());
    let tokens = players(3);
    let result = provider
        .send_to_devices(&tokens, &PushMessage::new("t", "b"))
        .await;

    assert!(!provider.is_ready());
    assert!(!result.success);
    assert_eq!(result.failure_count, 3);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_reinitialize_is_idempotent() {
    let server = MockServer::start().await;
    let mut provider = OneSignalProvider::with_api_base(reqwest::Client::new(), server.uri());

    provider.initialize(&config()).await.unwrap();
    provider.initialize(&config()).await.unwrap();
    assert!(provider.is_ready());
}
