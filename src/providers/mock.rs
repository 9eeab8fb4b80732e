/*!
 * Mock provider implementations for testing.
 *
 * This module provides a scripted provider that simulates different behaviors:
 * - `MockProvider::working()` - translates by tagging the text, classifies as `Satisfied`
 * - `MockProvider::intermittent(n)` - every n-th request fails
 * - `MockProvider::failing()` - always fails with a retryable API error
 * - `MockProvider::unauthorized()` - always fails with an authentication error
 * - `MockProvider::scripted(f)` - answers computed by a function of the request
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ProviderError;
use crate::providers::{CompletionRequest, CompletionResponse, Provider, RequestPurpose};

/// Function computing a scripted answer
pub type Responder = fn(&CompletionRequest) -> Result<String, ProviderError>;

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Always rejects the credentials
    Unauthorized,
    /// Returns empty response
    Empty,
    /// Answers from a function
    Scripted(Responder),
}

/// Mock provider for pipeline tests
#[derive(Debug, Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter for intermittent failures
    request_count: Arc<AtomicUsize>,
    /// Every request received, in order
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent {
            fail_every: fail_every.max(1),
        })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn unauthorized() -> Self {
        Self::new(MockBehavior::Unauthorized)
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn scripted(responder: Responder) -> Self {
        Self::new(MockBehavior::Scripted(responder))
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Requests of one purpose received so far
    pub fn requests_for(&self, purpose: RequestPurpose) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.purpose == purpose)
            .cloned()
            .collect()
    }

    /// Answer the working mock gives
    pub fn default_answer(request: &CompletionRequest) -> String {
        match request.purpose {
            RequestPurpose::Translation => format!("[TRANSLATED] {}", quoted_text(&request.prompt)),
            RequestPurpose::Classification => "Satisfied".to_string(),
        }
    }
}

/// Text between the first `"` after `Text is:` and the final `"` of a translation prompt
pub fn quoted_text(prompt: &str) -> &str {
    let body = prompt.split_once("Text is:").map(|(_, rest)| rest).unwrap_or(prompt).trim();
    body.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(body)
}

/// Review body of a classification prompt
pub fn review_text(prompt: &str) -> &str {
    prompt
        .rsplit_once("Review:\n")
        .map(|(_, text)| text.trim_end())
        .unwrap_or(prompt)
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let text = match self.behavior {
            MockBehavior::Working => Self::default_answer(&request),
            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    return Err(ProviderError::ApiError {
                        status_code: 503,
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                    });
                }
                Self::default_answer(&request)
            }
            MockBehavior::Failing => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "Simulated provider failure".to_string(),
                });
            }
            MockBehavior::Unauthorized => {
                return Err(ProviderError::AuthenticationError("Invalid API key".to_string()));
            }
            MockBehavior::Empty => String::new(),
            MockBehavior::Scripted(responder) => responder(&request)?,
        };

        Ok(CompletionResponse {
            prompt_tokens: Some(request.prompt.len() as u64 / 4),
            completion_tokens: Some(text.len() as u64 / 4),
            text,
        })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Unauthorized => Err(ProviderError::AuthenticationError("Invalid API key".to_string())),
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated outage".to_string())),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
