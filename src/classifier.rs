/*!
 * Review classification.
 *
 * The model is asked for a comma separated list of taxonomy categories (and
 * website names). The answer is normalized against the taxonomy, the first
 * taxonomy category becomes the review's primary category and the sentiment
 * is derived from the labels together with the star rating:
 *
 * 1. `Satisfied` without any complaint label: positive
 * 2. 1 to 3 stars: negative
 * 3. 4 stars: negative with a complaint label, neutral otherwise
 * 4. 5 stars: neutral with a complaint label, positive otherwise
 *
 * Complaint labels are all labels other than `Satisfied` and `Other`.
 * A review whose classification fails after every retry is recorded as
 * `Unclassified` with no labels; it is never dropped.
 */

use std::sync::Arc;

use log::{debug, error, warn};

use crate::errors::{ClassificationError, ProviderError};
use crate::prompts::{classification_prompt, strip_think_blocks};
use crate::providers::{CompletionRequest, Provider};
use crate::retry::{AttemptError, RequestGate};
use crate::reviews::{Classification, Sentiment, TranslatedReview};
use crate::taxonomy::{Label, OTHER, SATISFIED, Taxonomy, UNCLASSIFIED};

/// Labels recovered from one model answer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedLabels {
    /// Normalized labels in answer order, without duplicates
    pub labels: Vec<Label>,
    /// Parts of the answer that matched nothing
    pub dropped: Vec<String>,
}

impl ParsedLabels {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.as_str().to_string()).collect()
    }
}

/// Split a model answer into labels and normalize them
pub fn parse_labels(answer: &str, taxonomy: &Taxonomy) -> ParsedLabels {
    let mut parsed = ParsedLabels::default();

    for part in answer.split([',', '\n', ';']) {
        let part = part
            .trim()
            .trim_start_matches(|c: char| matches!(c, '-' | '*' | '•') || c.is_ascii_digit())
            .trim_start_matches(['.', ')'])
            .trim();
        if part.is_empty() {
            continue;
        }
        match taxonomy.normalize(part) {
            Some(label) => {
                if !parsed.labels.contains(&label) {
                    parsed.labels.push(label);
                }
            }
            None => parsed.dropped.push(part.to_string()),
        }
    }

    parsed
}

/// First taxonomy category of the answer; `Other` when only websites were named
pub fn primary_category(labels: &[Label]) -> String {
    labels
        .iter()
        .find_map(|l| match l {
            Label::Category(name) => Some(name.clone()),
            Label::Website(_) => None,
        })
        .unwrap_or_else(|| OTHER.to_string())
}

pub fn is_complaint(label: &str) -> bool {
    label != SATISFIED && label != OTHER && label != UNCLASSIFIED
}

/// Sentiment of a review from its labels and star rating
pub fn sentiment_for(rating: u8, labels: &[String]) -> Sentiment {
    let has_complaint = labels.iter().any(|l| is_complaint(l));
    let satisfied = labels.iter().any(|l| l == SATISFIED);

    if satisfied && !has_complaint {
        return Sentiment::Positive;
    }
    match rating {
        0..=3 => Sentiment::Negative,
        4 if has_complaint => Sentiment::Negative,
        4 => Sentiment::Neutral,
        _ if has_complaint => Sentiment::Neutral,
        _ => Sentiment::Positive,
    }
}

/// Describe a label set that does not fit the star rating, if any
pub fn rating_mismatch(rating: u8, labels: &[String]) -> Option<String> {
    let complaints: Vec<&str> = labels.iter().map(String::as_str).filter(|l| is_complaint(l)).collect();
    let satisfied = labels.iter().any(|l| l == SATISFIED);

    if rating >= 4 && !complaints.is_empty() && !satisfied {
        return Some(format!(
            "high rating ({} stars) with only complaint labels: {:?}",
            rating, complaints
        ));
    }
    if rating <= 2 && satisfied && labels.len() == 1 {
        return Some(format!("low rating ({} stars) classified only as 'Satisfied'", rating));
    }
    None
}

/// Classification of a review whose attempts all failed
pub fn unclassified(review: &TranslatedReview, attempts: u32, raw_output: Option<String>) -> Classification {
    Classification {
        review_id: review.review.id.clone(),
        category: UNCLASSIFIED.to_string(),
        labels: Vec::new(),
        sentiment: sentiment_for(review.review.star_rating, &[]),
        raw_output,
        attempts,
    }
}

/// Classifier backed by a language-model provider
#[derive(Debug, Clone)]
pub struct Classifier {
    provider: Arc<dyn Provider>,
    gate: Arc<RequestGate>,
    taxonomy: Taxonomy,
    app_name: String,
}

impl Classifier {
    pub fn new(provider: Arc<dyn Provider>, gate: Arc<RequestGate>, taxonomy: Taxonomy, app_name: impl Into<String>) -> Self {
        Self {
            provider,
            gate,
            taxonomy,
            app_name: app_name.into(),
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Classify one review.
    ///
    /// Always yields a classification unless the provider rejects the
    /// credentials, which is returned as an error for the whole batch.
    pub async fn classify(&self, review: &TranslatedReview) -> Result<Classification, ProviderError> {
        let rating = review.review.star_rating;
        let prompt = classification_prompt(&self.app_name, rating, review.classification_text(), &self.taxonomy);
        let provider = &self.provider;
        let taxonomy = &self.taxonomy;

        let result = self
            .gate
            .call("Classification", |_attempt| {
                let request = CompletionRequest::classification(prompt.clone());
                async move {
                    let response = match provider.complete(request).await {
                        Ok(response) => response,
                        Err(e) if e.is_retryable() => {
                            return Err(AttemptError::Retryable(ClassificationError::Provider(e)));
                        }
                        Err(e) => return Err(AttemptError::Fatal(ClassificationError::Provider(e))),
                    };

                    let answer = strip_think_blocks(&response.text);
                    let parsed = parse_labels(&answer, taxonomy);
                    if parsed.is_empty() {
                        return Err(AttemptError::Retryable(ClassificationError::Unparseable(answer)));
                    }
                    Ok((answer, parsed))
                }
            })
            .await;

        match result {
            Ok(attempted) => {
                let (answer, parsed) = attempted.value;
                if !parsed.dropped.is_empty() {
                    warn!("Unknown categories for review {}: {:?}", review.review.id, parsed.dropped);
                }

                let labels = parsed.names();
                if let Some(reason) = rating_mismatch(rating, &labels) {
                    warn!("Suspicious classification for review {}: {}", review.review.id, reason);
                }

                let classification = Classification {
                    review_id: review.review.id.clone(),
                    category: primary_category(&parsed.labels),
                    sentiment: sentiment_for(rating, &labels),
                    labels,
                    raw_output: Some(answer),
                    attempts: attempted.attempts,
                };
                debug!(
                    "Classified review {} as {} ({})",
                    classification.review_id, classification.category, classification.sentiment
                );
                Ok(classification)
            }
            Err(failure) if failure.fatal => match failure.error {
                ClassificationError::Provider(e) => Err(e),
                other => Err(ProviderError::RequestFailed(other.to_string())),
            },
            Err(failure) => {
                let raw_output = match &failure.error {
                    ClassificationError::Unparseable(answer) => Some(answer.clone()),
                    _ => None,
                };
                let error = ClassificationError::RetriesExhausted {
                    attempts: failure.attempts,
                    last_error: failure.error.to_string(),
                };
                error!("Classification failed for review {}: {}", review.review.id, error);
                Ok(unclassified(review, failure.attempts, raw_output))
            }
        }
    }
}
