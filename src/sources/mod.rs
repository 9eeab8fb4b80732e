/*!
 * Where reviews come from.
 *
 * - `bigquery`: the Play Store export in the data warehouse
 * - `csv_file`: a local CSV with the same columns, used with `--input`
 *
 * Sources return raw rows; validation happens once, in the pipeline, so both
 * sources are cleaned by the same rules.
 */

use async_trait::async_trait;

use crate::date_range::DateRange;
use crate::errors::FetchError;
use crate::reviews::RawReviewRow;

pub mod bigquery;
pub mod csv_file;

pub const COL_PACKAGE: &str = "Package_Name";
pub const COL_VERSION: &str = "App_Version_Name";
pub const COL_LANGUAGE: &str = "Reviewer_Language";
pub const COL_DEVICE: &str = "Device";
pub const COL_SUBMITTED: &str = "Review_Submit_Date_and_Time";
pub const COL_RATING: &str = "Star_Rating";
pub const COL_TEXT: &str = "Review_Text";
pub const COL_LINK: &str = "Review_Link";

/// Columns a source must provide
pub const REQUIRED_COLUMNS: &[&str] = &[COL_PACKAGE, COL_LANGUAGE, COL_SUBMITTED, COL_RATING, COL_TEXT];

/// Provider of review rows for a date range
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Fetch the rows of the given packages submitted within `range`
    async fn fetch(&self, packages: &[String], range: &DateRange) -> Result<Vec<RawReviewRow>, FetchError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Required columns absent from a header
pub fn missing_columns<'a, I>(header: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: Vec<&str> = header.into_iter().map(str::trim).collect();
    REQUIRED_COLUMNS
        .iter()
        .filter(|required| !present.contains(required))
        .map(|c| c.to_string())
        .collect()
}

/// Build a raw row from a column lookup; blank cells count as missing
pub fn row_from_columns<F>(lookup: F) -> RawReviewRow
where
    F: Fn(&str) -> Option<String>,
{
    let cell = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    RawReviewRow {
        package_name: cell(COL_PACKAGE).unwrap_or_default(),
        app_version: cell(COL_VERSION),
        device: cell(COL_DEVICE),
        language: cell(COL_LANGUAGE),
        submitted_at: cell(COL_SUBMITTED),
        star_rating: cell(COL_RATING),
        text: cell(COL_TEXT),
        link: cell(COL_LINK),
    }
}
