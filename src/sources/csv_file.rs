use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord};
use log::{info, warn};

use crate::date_range::DateRange;
use crate::errors::FetchError;
use crate::reviews::RawReviewRow;
use crate::sources::{ReviewSource, missing_columns, row_from_columns};

/// Reviews exported to a local CSV file.
///
/// The whole file is used: package and date filtering is left to validation
/// so that a file for the wrong week is reported instead of silently emptied.
#[derive(Debug, Clone)]
pub struct CsvReviewSource {
    path: PathBuf,
}

impl CsvReviewSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row of the file
    pub fn read_rows(&self) -> Result<Vec<RawReviewRow>, FetchError> {
        if !self.path.is_file() {
            return Err(FetchError::InputNotFound(self.path.clone()));
        }
        info!("Loading reviews from file: {:?}", self.path);

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(&self.path)
            .map_err(|e| csv_error(&self.path, e))?;

        let headers = reader.headers().map_err(|e| csv_error(&self.path, e))?.clone();
        let missing = missing_columns(headers.iter());
        if !missing.is_empty() {
            return Err(FetchError::MissingColumns(missing));
        }

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            match record {
                Ok(record) => rows.push(to_row(&headers, &record)),
                // Header is line 1
                Err(e) => warn!("Skipping unreadable CSV record on line {}: {}", index + 2, e),
            }
        }

        info!("Loaded {} reviews from file", rows.len());
        Ok(rows)
    }
}

fn to_row(headers: &StringRecord, record: &StringRecord) -> RawReviewRow {
    row_from_columns(|name| {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|i| record.get(i))
            .map(str::to_string)
    })
}

fn csv_error(path: &Path, error: csv::Error) -> FetchError {
    if error.is_io_error() {
        if let csv::ErrorKind::Io(io) = error.into_kind() {
            return FetchError::Io(io);
        }
        return FetchError::Malformed(format!("{:?}: unreadable", path));
    }
    FetchError::Malformed(format!("{:?}: {}", path, error))
}

#[async_trait]
impl ReviewSource for CsvReviewSource {
    async fn fetch(&self, _packages: &[String], _range: &DateRange) -> Result<Vec<RawReviewRow>, FetchError> {
        self.read_rows()
    }

    fn describe(&self) -> String {
        format!("file {:?}", self.path)
    }
}
