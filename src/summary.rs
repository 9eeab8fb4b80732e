use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::aggregate::WeekSummaryEntry;
use crate::date_range::{DateRange, parse_date};
use crate::errors::ConfigError;
use crate::file_utils::FileManager;

// @module: Summary file, one entry per processed week

/// Summary file loaded in memory; entries are kept in chronological order
#[derive(Debug, Clone)]
pub struct SummaryFile {
    // @field: Location on disk
    path: PathBuf,
    // @field: Entries ordered by (startDate, endDate)
    entries: Vec<WeekSummaryEntry>,
}

impl SummaryFile {
    /// Load the summary file. A missing or blank file is an empty summary.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No existing summary file found at {:?}, starting fresh", path);
                return Ok(Self::empty(path));
            }
            Err(e) => {
                return Err(ConfigError::InvalidSummaryFile {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        if content.trim().is_empty() {
            warn!("Summary file {:?} is empty, starting fresh", path);
            return Ok(Self::empty(path));
        }

        let mut entries: Vec<WeekSummaryEntry> =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidSummaryFile {
                path: path.clone(),
                reason: format!("expected a JSON array of week entries ({})", e),
            })?;

        let in_order = entries
            .windows(2)
            .all(|pair| chronological_key(&pair[0]) <= chronological_key(&pair[1]));
        if !in_order {
            warn!("Summary file {:?} is not in date order; entries are sorted by date range", path);
            entries.sort_by(|a, b| chronological_key(a).cmp(&chronological_key(b)));
        }

        info!("Loaded {} entries from summary file {:?}", entries.len(), path);
        Ok(Self { path, entries })
    }

    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[WeekSummaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&WeekSummaryEntry> {
        self.entries.last()
    }

    pub fn contains(&self, range: &DateRange) -> bool {
        self.entries.iter().any(|e| e.matches(range))
    }

    /// Range to process: the explicit dates when given, otherwise the week
    /// after the last entry.
    pub fn resolve_range(&self, start: Option<&str>, end: Option<&str>) -> Result<DateRange, ConfigError> {
        match (start, end) {
            (Some(start), Some(end)) => DateRange::parse(start, end),
            (None, None) => {
                let last = self.last().ok_or_else(|| ConfigError::MissingDateRange {
                    summary_file: self.path.clone(),
                })?;
                let previous_start = parse_date(&last.start_date).map_err(|_| ConfigError::InvalidSummaryFile {
                    path: self.path.clone(),
                    reason: format!("last entry has an invalid startDate {:?}", last.start_date),
                })?;
                Ok(DateRange::week_after(previous_start))
            }
            _ => Err(ConfigError::PartialDateRange),
        }
    }

    /// Insert an entry at its chronological position and refresh the trend
    /// fields of the entry and of its successor. Returns the position.
    pub fn insert(&mut self, entry: WeekSummaryEntry) -> usize {
        let index = self
            .entries
            .iter()
            .position(|e| chronological_key(e) > chronological_key(&entry))
            .unwrap_or(self.entries.len());

        if index < self.entries.len() {
            warn!(
                "Inserting {} -> {} before later entry {} -> {}",
                entry.start_date, entry.end_date, self.entries[index].start_date, self.entries[index].end_date
            );
        }
        self.entries.insert(index, entry);

        for position in [index, index + 1] {
            if position < self.entries.len() {
                let previous = position.checked_sub(1).map(|p| self.entries[p].clone());
                self.entries[position].apply_trend(previous.as_ref());
            }
        }
        index
    }

    /// Write the summary atomically
    pub fn save(&self) -> Result<()> {
        FileManager::write_json_atomic(&self.path, &self.entries)
            .with_context(|| format!("Failed to save summary file: {:?}", self.path))
    }
}

fn chronological_key(entry: &WeekSummaryEntry) -> (&str, &str) {
    (entry.start_date.as_str(), entry.end_date.as_str())
}
