/*!
 * Review data model.
 *
 * A `Review` is immutable once fetched. Translation wraps it in a
 * `TranslatedReview`, classification pairs that with a `Classification`.
 * The original text is carried through every stage.
 */

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::date_range::DateRange;
use crate::errors::FetchError;

/// One Play Store review as returned by the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Stable identifier (review link when available, content hash otherwise)
    pub id: String,
    /// App package identifier
    pub package_name: String,
    /// App version the review was written against
    #[serde(default)]
    pub app_version: Option<String>,
    /// Reviewer device
    #[serde(default)]
    pub device: Option<String>,
    /// Reviewer language code
    pub language: String,
    /// Star rating, 1..=5
    pub star_rating: u8,
    /// Review body as written
    pub text: String,
    /// Submission time
    pub submitted_at: DateTime<Utc>,
    /// Link to the review in the Play console
    #[serde(default)]
    pub link: Option<String>,
}

impl Review {
    /// Submission date in UTC
    pub fn submitted_on(&self) -> NaiveDate {
        self.submitted_at.date_naive()
    }
}

/// Derive an identifier for a review that has no link
pub fn derive_review_id(package_name: &str, submitted_at: &DateTime<Utc>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(package_name.as_bytes());
    hasher.update(submitted_at.to_rfc3339().as_bytes());
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("sha256:{}", &digest[..16])
}

/// Review plus the outcome of translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedReview {
    pub review: Review,
    /// English translation, when one was needed and succeeded
    #[serde(default)]
    pub translated_text: Option<String>,
    /// Language the translation was made from
    #[serde(default)]
    pub detected_language: Option<String>,
    /// Translation was needed but failed
    #[serde(default)]
    pub untranslated: bool,
}

impl TranslatedReview {
    /// Wrap a review that needs no translation
    pub fn unchanged(review: Review) -> Self {
        Self {
            review,
            translated_text: None,
            detected_language: None,
            untranslated: false,
        }
    }

    /// Text the classifier should read
    pub fn classification_text(&self) -> &str {
        self.translated_text.as_deref().unwrap_or(&self.review.text)
    }
}

/// Sentiment of a classified review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        };
        f.write_str(name)
    }
}

/// Classification of one review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Review this classification belongs to
    pub review_id: String,
    /// Primary taxonomy category, or `Unclassified`
    pub category: String,
    /// Every label the model assigned, taxonomy categories and websites
    #[serde(default)]
    pub labels: Vec<String>,
    pub sentiment: Sentiment,
    /// Model answer the labels were parsed from
    #[serde(default)]
    pub raw_output: Option<String>,
    /// Number of API attempts made
    #[serde(default)]
    pub attempts: u32,
}

/// Review with its translation and classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedReview {
    pub translated: TranslatedReview,
    pub classification: Classification,
}

impl ClassifiedReview {
    pub fn review(&self) -> &Review {
        &self.translated.review
    }
}

/// Parse the submission timestamps produced by BigQuery exports and pandas CSVs.
///
/// Accepted: RFC 3339, `YYYY-MM-DD HH:MM:SS[.f][+00:00| UTC]`, bare dates, and
/// epoch seconds as emitted by the BigQuery REST API (`1.7040672E9`).
pub fn parse_submit_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive_part = value.strip_suffix(" UTC").unwrap_or(value);
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_part, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(naive_part, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }

    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() {
            let whole = seconds.trunc() as i64;
            let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
            return Utc.timestamp_opt(whole, nanos.min(999_999_999)).single();
        }
    }

    None
}

/// Parse a star rating that may have been written as a float (`"5.0"`)
pub fn parse_star_rating(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(rating) = value.parse::<i64>() {
        return Some(rating);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite() && r.fract() == 0.0)
        .map(|r| r as i64)
}

/// Row as read from a source before validation
#[derive(Debug, Clone, Default)]
pub struct RawReviewRow {
    pub package_name: String,
    pub app_version: Option<String>,
    pub device: Option<String>,
    pub language: Option<String>,
    pub submitted_at: Option<String>,
    pub star_rating: Option<String>,
    pub text: Option<String>,
    pub link: Option<String>,
}

/// Turn raw rows into reviews, dropping rows that cannot be used.
///
/// Rows with a rating outside 1..=5, blank text or an unparseable submission
/// time are removed; each removal class is logged with its count. Ids that
/// repeat within the batch get a `#n` suffix in source order.
pub fn validate_rows(rows: Vec<RawReviewRow>) -> Vec<Review> {
    let original_count = rows.len();
    info!("Starting validation with {} reviews", original_count);

    let mut invalid_rating = 0usize;
    let mut empty_text = 0usize;
    let mut invalid_date = 0usize;
    let mut reviews = Vec::with_capacity(rows.len());
    let mut seen_ids: HashMap<String, usize> = HashMap::new();
    let mut repeated_ids = 0usize;

    for row in rows {
        let rating = match row.star_rating.as_deref().and_then(parse_star_rating) {
            Some(r) if (1..=5).contains(&r) => r as u8,
            _ => {
                invalid_rating += 1;
                continue;
            }
        };

        let text = match row.text {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                empty_text += 1;
                continue;
            }
        };

        let submitted_at = match row.submitted_at.as_deref().and_then(parse_submit_time) {
            Some(dt) => dt,
            None => {
                invalid_date += 1;
                continue;
            }
        };

        let link = row.link.filter(|l| !l.trim().is_empty());
        let mut id = link
            .clone()
            .unwrap_or_else(|| derive_review_id(&row.package_name, &submitted_at, &text));
        let occurrences = seen_ids.entry(id.clone()).or_insert(0);
        *occurrences += 1;
        if *occurrences > 1 {
            repeated_ids += 1;
            id = format!("{}#{}", id, occurrences);
        }

        reviews.push(Review {
            id,
            package_name: row.package_name,
            app_version: row.app_version.filter(|v| !v.trim().is_empty()),
            device: row.device.filter(|v| !v.trim().is_empty()),
            language: row.language.unwrap_or_default().trim().to_string(),
            star_rating: rating,
            text,
            submitted_at,
            link,
        });
    }

    if invalid_rating > 0 {
        warn!("Removing {} reviews with invalid star ratings", invalid_rating);
    }
    if empty_text > 0 {
        warn!("Removing {} reviews with null or empty text", empty_text);
    }
    if invalid_date > 0 {
        warn!("Removing {} reviews with invalid dates", invalid_date);
    }
    if repeated_ids > 0 {
        warn!("{} reviews share an id with an earlier review and were given a suffix", repeated_ids);
    }

    info!(
        "Validation completed: kept {} reviews, removed {} bad reviews",
        reviews.len(),
        original_count - reviews.len()
    );
    reviews
}

/// Fail when any review was submitted outside the range being processed
pub fn ensure_within_range(reviews: &[Review], range: &DateRange) -> Result<(), FetchError> {
    let outside: Vec<NaiveDate> = reviews
        .iter()
        .map(Review::submitted_on)
        .filter(|d| !range.contains(*d))
        .collect();

    if outside.is_empty() {
        return Ok(());
    }

    let dates = reviews.iter().map(Review::submitted_on);
    let earliest = dates.clone().min().map(|d| d.to_string()).unwrap_or_default();
    let latest = dates.max().map(|d| d.to_string()).unwrap_or_default();
    Err(FetchError::OutOfRange {
        range: range.to_string(),
        count: outside.len(),
        earliest,
        latest,
    })
}
