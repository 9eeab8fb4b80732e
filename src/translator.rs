/*!
 * Per-review translation into English.
 *
 * A review is translated when its declared language is known and not English.
 * Failures are recovered: the review keeps its original text, is flagged
 * `untranslated` and the batch continues. Only an authentication failure,
 * which would fail every later call as well, is returned to the caller.
 */

use std::sync::Arc;

use log::{debug, error};

use crate::errors::{ProviderError, TranslationError};
use crate::language_utils::{base_language, display_name, is_english};
use crate::prompts::{strip_think_blocks, translation_prompt};
use crate::providers::{CompletionRequest, Provider};
use crate::retry::{AttemptError, Attempted, RequestGate, RetryFailure};
use crate::reviews::{Review, TranslatedReview};

/// Language every review is translated into
pub const TARGET_LANGUAGE: &str = "en";

/// Whether the review's declared language calls for a translation
pub fn needs_translation(review: &Review) -> bool {
    let base = base_language(&review.language);
    !base.is_empty() && base != TARGET_LANGUAGE && !is_english(&review.language)
}

/// Translator backed by a language-model provider
#[derive(Debug, Clone)]
pub struct Translator {
    provider: Arc<dyn Provider>,
    gate: Arc<RequestGate>,
}

impl Translator {
    pub fn new(provider: Arc<dyn Provider>, gate: Arc<RequestGate>) -> Self {
        Self { provider, gate }
    }

    /// Translate one review, recovering from per-review failures
    pub async fn translate(&self, review: Review) -> Result<TranslatedReview, ProviderError> {
        if !needs_translation(&review) {
            return Ok(TranslatedReview::unchanged(review));
        }

        let language = base_language(&review.language);
        match self.translate_text(&language, &review.text).await {
            Ok(Attempted { value, attempts }) => {
                debug!(
                    "Translated review {} from {} in {} attempt(s): {}",
                    review.id,
                    language,
                    attempts,
                    preview(&value)
                );
                Ok(TranslatedReview {
                    review,
                    translated_text: Some(value),
                    detected_language: Some(language),
                    untranslated: false,
                })
            }
            Err(failure) if failure.fatal => Err(failure.error),
            Err(failure) => {
                let error = TranslationError::RetriesExhausted {
                    attempts: failure.attempts,
                    last_error: failure.error.to_string(),
                };
                error!("Translation failed for review {}: {}", review.id, error);
                Ok(TranslatedReview {
                    review,
                    translated_text: None,
                    detected_language: Some(language),
                    untranslated: true,
                })
            }
        }
    }

    async fn translate_text(&self, language: &str, text: &str) -> Result<Attempted<String>, RetryFailure<ProviderError>> {
        let prompt = translation_prompt(&display_name(language), &display_name(TARGET_LANGUAGE), text);
        let provider = &self.provider;

        self.gate
            .call("Translation", |_attempt| {
                let request = CompletionRequest::translation(prompt.clone());
                async move {
                    match provider.complete(request).await {
                        Ok(response) => {
                            let answer = strip_think_blocks(&response.text);
                            if answer.is_empty() {
                                Err(AttemptError::Retryable(ProviderError::EmptyResponse))
                            } else {
                                Ok(answer)
                            }
                        }
                        Err(e) if e.is_retryable() => Err(AttemptError::Retryable(e)),
                        Err(e) => Err(AttemptError::Fatal(e)),
                    }
                }
            })
            .await
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
