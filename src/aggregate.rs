/*!
 * Aggregation of a classified week.
 *
 * `WeekDetail` is the content of the per-week detail file: sentiment counts,
 * per-category shares of the primary categories, multi-label counts, reviews
 * grouped by label and every classified review. It is a pure function of the
 * classified reviews (no timestamps, ordered maps), so rebuilding it from the
 * same cache yields the same bytes.
 *
 * `WeekSummaryEntry` is the compact record appended to the summary file.
 */

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::date_range::DateRange;
use crate::reviews::{ClassifiedReview, Sentiment};
use crate::taxonomy::{Taxonomy, UNCLASSIFIED};

/// Sentiment counts and ratios of one week
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentBreakdown {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
}

/// Count and share of one primary category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub name: String,
    pub count: usize,
    pub percentage: f64,
}

/// Review as listed under each of its labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedReview {
    pub device: Option<String>,
    pub version: Option<String>,
    pub package: String,
    pub rating: u8,
    pub language: String,
    pub text: String,
    pub translated: Option<String>,
    pub link: Option<String>,
}

/// Classified review as written to the detail file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: String,
    pub package: String,
    pub version: Option<String>,
    pub device: Option<String>,
    pub language: String,
    pub rating: u8,
    pub submitted_at: String,
    pub text: String,
    pub translated: Option<String>,
    pub untranslated: bool,
    pub category: String,
    pub labels: Vec<String>,
    pub sentiment: Sentiment,
    pub attempts: u32,
}

/// Content of `results-<start>-to-<end>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekDetail {
    pub start_date: String,
    pub end_date: String,
    pub total_reviews: usize,
    pub sentiment: SentimentBreakdown,
    /// Primary categories in taxonomy order, then `Unclassified`
    pub categories: Vec<CategoryShare>,
    /// Every label with the number of reviews carrying it
    pub labels: BTreeMap<String, usize>,
    pub grouped: BTreeMap<String, Vec<GroupedReview>>,
    pub reviews: Vec<ReviewRecord>,
}

/// One line of the summary file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekSummaryEntry {
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "endDate")]
    pub end_date: String,
    pub file: String,
    #[serde(rename = "TotalCount", default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    #[serde(rename = "PositiveCount", default)]
    pub positive_count: usize,
    #[serde(rename = "NegativeCount", default)]
    pub negative_count: usize,
    #[serde(rename = "NeutralCount", default, skip_serializing_if = "Option::is_none")]
    pub neutral_count: Option<usize>,
    #[serde(rename = "UnclassifiedCount", default, skip_serializing_if = "Option::is_none")]
    pub unclassified_count: Option<usize>,
    #[serde(rename = "PositiveRatio", default, skip_serializing_if = "Option::is_none")]
    pub positive_ratio: Option<f64>,
    #[serde(rename = "NegativeRatio", default, skip_serializing_if = "Option::is_none")]
    pub negative_ratio: Option<f64>,
    /// Multi-label counts, websites included
    #[serde(rename = "Categories", default)]
    pub categories: BTreeMap<String, usize>,
    /// Share of each primary category
    #[serde(rename = "CategoryPercentages", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_percentages: BTreeMap<String, f64>,
    #[serde(rename = "TotalChange", default, skip_serializing_if = "Option::is_none")]
    pub total_change: Option<i64>,
    #[serde(rename = "NegativeRatioChange", default, skip_serializing_if = "Option::is_none")]
    pub negative_ratio_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Fields written by other tools, kept as they are
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl WeekSummaryEntry {
    pub fn matches(&self, range: &DateRange) -> bool {
        self.start_date == range.start_str() && self.end_date == range.end_str()
    }

    /// Recompute the trend fields against the entry that precedes this one
    pub fn apply_trend(&mut self, previous: Option<&WeekSummaryEntry>) {
        let previous_total = previous.and_then(|p| p.total_count);
        self.total_change = match (self.total_count, previous_total) {
            (Some(current), Some(prev)) => Some(current as i64 - prev as i64),
            _ => None,
        };

        let previous_ratio = previous.and_then(|p| p.negative_ratio);
        self.negative_ratio_change = match (self.negative_ratio, previous_ratio) {
            (Some(current), Some(prev)) => Some(round_to(current - prev, 4)),
            _ => None,
        };
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { round_to(count as f64 / total as f64, 4) }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(count as f64 * 100.0 / total as f64, 2)
    }
}

/// Labels a review is counted under; failures count as `Unclassified`
fn counted_labels(review: &ClassifiedReview) -> Vec<String> {
    if review.classification.labels.is_empty() {
        vec![review.classification.category.clone()]
    } else {
        review.classification.labels.clone()
    }
}

fn grouped_review(review: &ClassifiedReview) -> GroupedReview {
    let original = review.review();
    GroupedReview {
        device: original.device.clone(),
        version: original.app_version.clone(),
        package: original.package_name.clone(),
        rating: original.star_rating,
        language: original.language.clone(),
        text: original.text.clone(),
        translated: review.translated.translated_text.clone(),
        link: original.link.clone(),
    }
}

fn review_record(review: &ClassifiedReview) -> ReviewRecord {
    let original = review.review();
    ReviewRecord {
        id: original.id.clone(),
        package: original.package_name.clone(),
        version: original.app_version.clone(),
        device: original.device.clone(),
        language: original.language.clone(),
        rating: original.star_rating,
        submitted_at: original.submitted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        text: original.text.clone(),
        translated: review.translated.translated_text.clone(),
        untranslated: review.translated.untranslated,
        category: review.classification.category.clone(),
        labels: review.classification.labels.clone(),
        sentiment: review.classification.sentiment,
        attempts: review.classification.attempts,
    }
}

/// Build the detail file content for one week
pub fn build_week_detail(range: &DateRange, reviews: &[ClassifiedReview], taxonomy: &Taxonomy) -> WeekDetail {
    let total = reviews.len();
    info!("Grouping classifications for {} reviews", total);

    let mut sentiment = SentimentBreakdown::default();
    let mut primary: BTreeMap<&str, usize> = BTreeMap::new();
    let mut labels: BTreeMap<String, usize> = BTreeMap::new();
    let mut grouped: BTreeMap<String, Vec<GroupedReview>> = BTreeMap::new();

    for review in reviews {
        match review.classification.sentiment {
            Sentiment::Positive => sentiment.positive += 1,
            Sentiment::Negative => sentiment.negative += 1,
            Sentiment::Neutral => sentiment.neutral += 1,
        }
        *primary.entry(review.classification.category.as_str()).or_default() += 1;

        for label in counted_labels(review) {
            *labels.entry(label.clone()).or_default() += 1;
            grouped.entry(label).or_default().push(grouped_review(review));
        }
    }
    sentiment.positive_ratio = ratio(sentiment.positive, total);
    sentiment.negative_ratio = ratio(sentiment.negative, total);

    let categories = taxonomy
        .names()
        .chain(std::iter::once(UNCLASSIFIED))
        .map(|name| {
            let count = primary.get(name).copied().unwrap_or(0);
            CategoryShare {
                name: name.to_string(),
                count,
                percentage: percentage(count, total),
            }
        })
        .collect();

    for (label, count) in &labels {
        info!("{}: {} reviews", label, count);
    }

    WeekDetail {
        start_date: range.start_str(),
        end_date: range.end_str(),
        total_reviews: total,
        sentiment,
        categories,
        labels,
        grouped,
        reviews: reviews.iter().map(review_record).collect(),
    }
}

/// Build the summary entry for a week; trend fields are left to the caller
pub fn build_summary_entry(range: &DateRange, detail: &WeekDetail, created: DateTime<Utc>) -> WeekSummaryEntry {
    let unclassified = detail
        .categories
        .iter()
        .find(|c| c.name == UNCLASSIFIED)
        .map(|c| c.count)
        .unwrap_or(0);

    let entry = WeekSummaryEntry {
        start_date: range.start_str(),
        end_date: range.end_str(),
        file: range.detail_file_name(),
        total_count: Some(detail.total_reviews),
        positive_count: detail.sentiment.positive,
        negative_count: detail.sentiment.negative,
        neutral_count: Some(detail.sentiment.neutral),
        unclassified_count: Some(unclassified),
        positive_ratio: Some(detail.sentiment.positive_ratio),
        negative_ratio: Some(detail.sentiment.negative_ratio),
        categories: detail.labels.clone(),
        category_percentages: detail
            .categories
            .iter()
            .filter(|c| c.count > 0)
            .map(|c| (c.name.clone(), c.percentage))
            .collect(),
        total_change: None,
        negative_ratio_change: None,
        created: Some(created.to_rfc3339_opts(SecondsFormat::Secs, true)),
        extra: BTreeMap::new(),
    };

    info!(
        "Created summary entry: {} positive, {} negative reviews",
        entry.positive_count, entry.negative_count
    );
    entry
}
