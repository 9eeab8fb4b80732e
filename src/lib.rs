/*!
 * # reviewlens - weekly Play Store review classification
 *
 * A Rust library for turning a week of Play Store reviews into a dashboard
 * time series.
 *
 * ## Features
 *
 * - Fetch reviews from BigQuery, or read them from a CSV export
 * - Translate non-English reviews with a language model
 * - Classify every review into a fixed category taxonomy
 * - Cache fetched and classified reviews per date range, with resumable classification
 * - Aggregate category shares and sentiment into a detail file and a summary entry
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `date_range`: Date ranges identifying one batch
 * - `reviews`: Review data model and row validation
 * - `taxonomy`: Category set and label normalization
 * - `sources`: Review sources:
 *   - `sources::bigquery`: BigQuery REST reader
 *   - `sources::csv_file`: Local CSV reader
 * - `cache`: Per-range snapshots of fetched and classified reviews
 * - `providers`: Client implementations for LLM providers:
 *   - `providers::openai`: OpenAI API client
 *   - `providers::mock`: Scripted provider for tests
 * - `retry`: Rate limiting and retry with backoff
 * - `prompts`: Prompt templates
 * - `translator`: Per-review translation
 * - `classifier`: Per-review classification and sentiment
 * - `aggregate`: Detail file and summary entry construction
 * - `summary`: Summary file handling
 * - `pipeline`: The batch state machine
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod aggregate;
pub mod app_config;
pub mod cache;
pub mod classifier;
pub mod date_range;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod reviews;
pub mod sources;
pub mod summary;
pub mod taxonomy;
pub mod translator;

// Re-export main types for easier usage
pub use app_config::Config;
pub use date_range::DateRange;
pub use errors::{AppError, ClassificationError, ConfigError, FetchError, ProviderError, TranslationError};
pub use pipeline::{Pipeline, PipelineStage, RunOutcome, RunRequest};
pub use reviews::{Classification, ClassifiedReview, Review, Sentiment, TranslatedReview};
