/*!
 * Tests for review classification against a scripted provider
 */

use reviewlens::classifier::Classifier;
use reviewlens::errors::ProviderError;
use reviewlens::providers::RequestPurpose;
use reviewlens::providers::mock::MockProvider;
use reviewlens::reviews::{Sentiment, TranslatedReview};
use reviewlens::taxonomy::{Taxonomy, UNCLASSIFIED};

use crate::common::{self, scripted_answers};

fn classifier(mock: MockProvider) -> (MockProvider, Classifier) {
    let (mock, provider) = common::shared_provider(mock);
    let classifier = Classifier::new(provider, common::instant_gate(), Taxonomy::default(), "the Firefox browser");
    (mock, classifier)
}

fn english(id: &str, rating: u8, text: &str) -> TranslatedReview {
    TranslatedReview::unchanged(common::sample_review(id, "en", rating, text))
}

#[tokio::test]
async fn test_classify_withCrashReview_shouldBeNegativeCrash() {
    let (mock, classifier) = classifier(MockProvider::scripted(scripted_answers::keyword_answers));

    let classification = classifier.classify(&english("r1", 1, "It crashes on startup")).await.unwrap();

    assert_eq!(classification.review_id, "r1");
    assert_eq!(classification.category, "Crash");
    assert_eq!(classification.labels, vec!["Crash"]);
    assert_eq!(classification.sentiment, Sentiment::Negative);
    assert_eq!(classification.attempts, 1);
    assert_eq!(mock.requests_for(RequestPurpose::Classification).len(), 1);
}

#[tokio::test]
async fn test_classify_withWebsiteFirst_shouldUseFirstCategoryAsPrimary() {
    let (_mock, classifier) = classifier(MockProvider::scripted(scripted_answers::keyword_answers));

    let classification = classifier
        .classify(&english("r2", 4, "youtube videos do not play"))
        .await
        .unwrap();

    assert_eq!(classification.category, "Webcompat");
    assert_eq!(classification.labels, vec!["YouTube", "Webcompat"]);
    assert_eq!(classification.sentiment, Sentiment::Negative);
}

#[tokio::test]
async fn test_classify_withFiveStarsAndComplaint_shouldNotBeNegative() {
    let (_mock, classifier) = classifier(MockProvider::scripted(scripted_answers::keyword_answers));

    let classification = classifier
        .classify(&english("r3", 5, "Best browser but pages are slow sometimes"))
        .await
        .unwrap();

    assert_eq!(classification.category, "Pageload");
    assert_eq!(classification.sentiment, Sentiment::Neutral);
}

#[tokio::test]
async fn test_classify_withThreeStarsAndNoComplaint_shouldBeNegative() {
    let (_mock, classifier) = classifier(MockProvider::scripted(scripted_answers::keyword_answers));

    let classification = classifier.classify(&english("r4", 3, "It is okay I guess")).await.unwrap();

    assert_eq!(classification.category, "Other");
    assert_eq!(classification.sentiment, Sentiment::Negative);
}

#[tokio::test]
async fn test_classify_withReasoningBlock_shouldIgnoreIt() {
    let (_mock, classifier) = classifier(MockProvider::scripted(scripted_answers::thinking_answers));

    let classification = classifier.classify(&english("r5", 2, "crash after update")).await.unwrap();

    assert_eq!(classification.category, "Crash");
    assert_eq!(classification.raw_output.as_deref(), Some("Crash"));
}

#[tokio::test]
async fn test_classify_withTranslatedReview_shouldClassifyTranslation() {
    let (mock, classifier) = classifier(MockProvider::scripted(scripted_answers::keyword_answers));
    let review = TranslatedReview {
        review: common::sample_review("r6", "de", 1, "Stürzt ständig ab"),
        translated_text: Some("It keeps crashing".to_string()),
        detected_language: Some("de".to_string()),
        untranslated: false,
    };

    let classification = classifier.classify(&review).await.unwrap();

    assert_eq!(classification.category, "Crash");
    let prompt = &mock.requests()[0].prompt;
    assert!(prompt.contains("It keeps crashing"));
    assert!(!prompt.contains("Stürzt"));
}

#[tokio::test]
async fn test_classify_withUnparseableAnswers_shouldBeUnclassifiedAfterRetries() {
    let (mock, classifier) = classifier(MockProvider::scripted(scripted_answers::keyword_answers));

    let classification = classifier.classify(&english("r7", 2, "gibberish")).await.unwrap();

    assert_eq!(classification.category, UNCLASSIFIED);
    assert!(classification.labels.is_empty());
    assert_eq!(classification.attempts, 3);
    assert_eq!(classification.raw_output.as_deref(), Some("I am not sure what you mean"));
    assert_eq!(classification.sentiment, Sentiment::Negative);
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn test_classify_withFailingProvider_shouldRecordUnclassified() {
    let (mock, classifier) = classifier(MockProvider::failing());

    let classification = classifier.classify(&english("r8", 5, "Fine")).await.unwrap();

    assert_eq!(classification.category, UNCLASSIFIED);
    assert_eq!(classification.raw_output, None);
    assert_eq!(classification.sentiment, Sentiment::Positive);
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn test_classify_withIntermittentProvider_shouldRecover() {
    let (mock, classifier) = classifier(MockProvider::intermittent(2));

    let first = classifier.classify(&english("r9", 5, "Love it")).await.unwrap();
    let second = classifier.classify(&english("r10", 5, "Love it too")).await.unwrap();

    assert_eq!(first.attempts, 1);
    assert_eq!(second.attempts, 2);
    assert_eq!(second.category, "Satisfied");
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn test_classify_withRejectedCredentials_shouldFailFast() {
    let (mock, classifier) = classifier(MockProvider::unauthorized());

    let result = classifier.classify(&english("r11", 1, "crash")).await;

    assert!(matches!(result, Err(ProviderError::AuthenticationError(_))));
    assert_eq!(mock.request_count(), 1);
}
