/*!
 * Error types for the reviewlens pipeline.
 *
 * Per-review failures (`TranslationError`, `ClassificationError`) are recovered
 * inside the batch. Everything that reaches `AppError` aborts the run before the
 * summary file is touched.
 */

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when talking to the language-model API
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The API answered but the answer had no usable text
    #[error("Empty response from API")]
    EmptyResponse,
}

impl ProviderError {
    /// Whether retrying the same request could succeed.
    ///
    /// Authentication failures are a property of the whole batch, so retrying
    /// them per review only burns the retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::AuthenticationError(_))
    }
}

/// Errors raised while obtaining reviews from the warehouse or a local file
#[derive(Error, Debug)]
pub enum FetchError {
    /// The warehouse could not be reached
    #[error("Warehouse unreachable: {0}")]
    Unreachable(String),

    /// The warehouse rejected the query
    #[error("Warehouse query failed ({status_code}): {message}")]
    QueryFailed {
        /// HTTP status code returned by the warehouse
        status_code: u16,
        /// Error body
        message: String,
    },

    /// Credentials for the warehouse could not be obtained
    #[error("Warehouse credentials unavailable: {0}")]
    Credentials(String),

    /// The response or input file did not have the expected shape
    #[error("Malformed review data: {0}")]
    Malformed(String),

    /// Required columns are absent from the input
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Local input file does not exist
    #[error("Input file not found: {0:?}")]
    InputNotFound(PathBuf),

    /// Reviews were returned for dates outside the requested range
    #[error("{count} review(s) fall outside {range} (found {earliest} -> {latest})")]
    OutOfRange {
        /// Range that was requested
        range: String,
        /// Number of offending reviews
        count: usize,
        /// Earliest submission date found
        earliest: String,
        /// Latest submission date found
        latest: String,
    },

    /// I/O failure while reading local input
    #[error("I/O error reading reviews: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-review translation failure
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// All attempts were used up
    #[error("Translation gave up after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last error message
        last_error: String,
    },
}

/// Per-review classification failure
#[derive(Error, Debug)]
pub enum ClassificationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The model answered with nothing that maps to a category
    #[error("Unparseable classification: {0:?}")]
    Unparseable(String),

    /// All attempts were used up
    #[error("Classification gave up after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last error message
        last_error: String,
    },
}

/// Missing or inconsistent run configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No explicit dates and nothing to continue from
    #[error("No previous week found in {summary_file:?}; pass --startDate and --endDate for the first run")]
    MissingDateRange {
        /// Summary file consulted
        summary_file: PathBuf,
    },

    /// Only one of the two date flags was given
    #[error("--startDate and --endDate must be supplied together (or neither)")]
    PartialDateRange,

    /// A date did not parse
    #[error("Invalid date {value:?}: expected YYYY-MM-DD")]
    InvalidDate {
        /// Offending input
        value: String,
    },

    /// End date precedes start date
    #[error("Invalid date range: {start} is after {end}")]
    InvertedRange {
        /// Start date
        start: String,
        /// End date
        end: String,
    },

    /// The summary file exists but cannot be used
    #[error("Cannot use summary file {path:?}: {reason}")]
    InvalidSummaryFile {
        /// Summary file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Classification is needed but there is no API key
    #[error("OPENAI_API_KEY must be set to classify reviews that are not cached")]
    MissingApiKey,

    /// The configuration file cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failure reading or writing a cache entry
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure
    #[error("Cache I/O error at {path:?}: {source}")]
    Io {
        /// Cache file path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Snapshot could not be encoded
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Main application error type; any of these aborts the run
#[derive(Error, Debug)]
pub enum AppError {
    /// Review fetch failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Configuration is missing or wrong
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cache could not be written
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Batch-level provider failure (e.g. bad credentials)
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::File(format!("{:#}", error))
    }
}
