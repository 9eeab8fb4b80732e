/*!
 * Scripted model answers for pipeline tests
 *
 * Each function is a `Responder` for `MockProvider::scripted`. Classification
 * answers are chosen from keywords in the review text so that tests can steer
 * individual reviews.
 */

use reviewlens::errors::ProviderError;
use reviewlens::providers::mock::{quoted_text, review_text};
use reviewlens::providers::{CompletionRequest, RequestPurpose};

/// Review text marker that makes every classification attempt fail
pub const ALWAYS_FAIL: &str = "always-fail";

/// Review text marker that makes classification fail with rejected credentials
pub const REVOKED: &str = "revoked";

fn translate(request: &CompletionRequest) -> String {
    let text = quoted_text(&request.prompt);
    if text.contains("Stürzt") {
        "It keeps crashing".to_string()
    } else {
        format!("[TRANSLATED] {}", text)
    }
}

fn classify(request: &CompletionRequest) -> Result<String, ProviderError> {
    let text = review_text(&request.prompt).to_lowercase();
    let answer = if text.contains(ALWAYS_FAIL) {
        return Err(ProviderError::ApiError {
            status_code: 503,
            message: "Service unavailable".to_string(),
        });
    } else if text.contains("crash") {
        "Crash"
    } else if text.contains("slow") {
        "Pageload, Slow"
    } else if text.contains("youtube") {
        "YouTube, Webcompat"
    } else if text.contains("love") || text.contains("great") {
        "Satisfied"
    } else if text.contains("gibberish") {
        "I am not sure what you mean"
    } else {
        "Other"
    };
    Ok(answer.to_string())
}

/// Translations and keyword classifications
pub fn keyword_answers(request: &CompletionRequest) -> Result<String, ProviderError> {
    match request.purpose {
        RequestPurpose::Translation => Ok(translate(request)),
        RequestPurpose::Classification => classify(request),
    }
}

/// Keyword classifications; every translation fails
pub fn failing_translations(request: &CompletionRequest) -> Result<String, ProviderError> {
    match request.purpose {
        RequestPurpose::Translation => Err(ProviderError::ConnectionError("connection reset".to_string())),
        RequestPurpose::Classification => classify(request),
    }
}

/// Answers wrapped in a reasoning block
pub fn thinking_answers(request: &CompletionRequest) -> Result<String, ProviderError> {
    keyword_answers(request).map(|answer| format!("<think>\nThe user wants a label.\n</think>\n\n{}", answer))
}

/// Keyword answers, except that the credentials are rejected for reviews
/// mentioning `REVOKED`
pub fn revoking_answers(request: &CompletionRequest) -> Result<String, ProviderError> {
    if request.purpose == RequestPurpose::Classification && review_text(&request.prompt).contains(REVOKED) {
        return Err(ProviderError::AuthenticationError("API key revoked".to_string()));
    }
    keyword_answers(request)
}
