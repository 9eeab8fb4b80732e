/*!
 * Tests for provider implementations
 */

use reqwest::StatusCode;
use reviewlens::app_config::ModelConfig;
use reviewlens::errors::ProviderError;
use reviewlens::providers::mock::MockProvider;
use reviewlens::providers::openai::{OpenAI, OpenAIResponse, map_status_error};
use reviewlens::providers::{CompletionRequest, Provider};

#[tokio::test]
async fn test_mock_test_connection_shouldFollowBehavior() {
    assert!(MockProvider::working().test_connection().await.is_ok());
    assert!(matches!(
        MockProvider::unauthorized().test_connection().await,
        Err(ProviderError::AuthenticationError(_))
    ));
    assert!(MockProvider::failing().test_connection().await.is_err());
}

#[tokio::test]
async fn test_mock_empty_shouldAnswerWithNothing() {
    let provider = MockProvider::empty();
    let response = provider
        .complete(CompletionRequest::classification("Review:\nhello"))
        .await
        .unwrap();
    assert!(response.text.is_empty());
    assert_eq!(provider.name(), "mock");
}

#[test]
fn test_openai_from_config_shouldUseConfiguredModel() {
    let config = ModelConfig {
        model: "gpt-4o-mini".to_string(),
        api_key: "sk-test".to_string(),
        ..ModelConfig::default()
    };
    let client = OpenAI::from_config(&config);
    assert_eq!(client.model(), "gpt-4o-mini");
    assert_eq!(client.name(), "openai");
}

#[test]
fn test_openai_map_status_error_shouldClassifyStatuses() {
    assert!(matches!(
        map_status_error(StatusCode::FORBIDDEN, "denied"),
        ProviderError::AuthenticationError(_)
    ));
    assert!(matches!(
        map_status_error(StatusCode::TOO_MANY_REQUESTS, r#"{"error": {"message": "Rate limit reached"}}"#),
        ProviderError::RateLimitExceeded(message) if message == "Rate limit reached"
    ));
    match map_status_error(StatusCode::BAD_GATEWAY, "upstream down") {
        ProviderError::ApiError { status_code, message } => {
            assert_eq!(status_code, 502);
            assert_eq!(message, "upstream down");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_openai_extract_text_shouldSkipEmptyChoices() {
    let response: OpenAIResponse = serde_json::from_str(
        r#"{
            "choices": [
                { "message": { "role": "assistant", "content": "   " } },
                { "message": { "role": "assistant", "content": " Crash, Tabs \n" } }
            ],
            "usage": { "prompt_tokens": 120, "completion_tokens": 4, "total_tokens": 124 }
        }"#,
    )
    .unwrap();

    assert_eq!(OpenAI::extract_text_from_response(&response).as_deref(), Some("Crash, Tabs"));
    assert_eq!(response.usage.map(|u| u.completion_tokens), Some(4));
}
