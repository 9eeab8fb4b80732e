/*!
 * Language-model providers.
 *
 * - `openai`: OpenAI chat-completions client
 * - `mock`: scripted provider used by tests and dry runs
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// What a completion request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPurpose {
    Translation,
    Classification,
}

/// Single-turn completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// User message sent to the model
    pub prompt: String,
    pub purpose: RequestPurpose,
}

impl CompletionRequest {
    pub fn translation(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            purpose: RequestPurpose::Translation,
        }
    }

    pub fn classification(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            purpose: RequestPurpose::Classification,
        }
    }
}

/// Text answer plus token accounting when the provider reports it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResponse {
    pub text: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Common trait for all LLM providers
///
/// The translator and classifier only talk to the model through this trait,
/// so any provider can be swapped in, including the scripted mock in tests.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Complete a request using this provider
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

pub mod mock;
pub mod openai;
