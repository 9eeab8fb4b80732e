/*!
 * On-disk snapshots of the expensive pipeline stages.
 *
 * Each date range gets its own directory under the data dir:
 *
 * - `reviews.json`: validated reviews as fetched
 * - `classify.json`: translated and classified reviews
 * - `classify.partial.json`: checkpoint written while classification runs
 *
 * Every file is an envelope carrying the format version, the range key, the
 * stage and a SHA-256 checksum of the payload. A file whose envelope does not
 * match is treated as absent, so a damaged snapshot costs a recomputation
 * rather than a wrong result. There is no expiry; delete the directory to
 * invalidate.
 */

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::date_range::DateRange;
use crate::errors::CacheError;
use crate::file_utils::FileManager;
use crate::reviews::{ClassifiedReview, Review};

/// Envelope format version
pub const CACHE_VERSION: u32 = 1;

/// Which stage a snapshot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStage {
    Reviews,
    Classify,
    Partial,
}

impl CacheStage {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Reviews => "reviews.json",
            Self::Classify => "classify.json",
            Self::Partial => "classify.partial.json",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    range: String,
    stage: CacheStage,
    checksum: String,
    payload: T,
}

/// Snapshot store keyed by date range
#[derive(Debug, Clone)]
pub struct ReviewCache {
    root: PathBuf,
}

impl ReviewCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the snapshots of one range
    pub fn dir_for(&self, range: &DateRange) -> PathBuf {
        self.root.join(range.key())
    }

    pub fn path_for(&self, range: &DateRange, stage: CacheStage) -> PathBuf {
        self.dir_for(range).join(stage.file_name())
    }

    pub fn load_reviews(&self, range: &DateRange) -> Option<Vec<Review>> {
        self.load(range, CacheStage::Reviews)
    }

    pub fn store_reviews(&self, range: &DateRange, reviews: &[Review]) -> Result<(), CacheError> {
        self.store(range, CacheStage::Reviews, reviews)
    }

    pub fn load_classified(&self, range: &DateRange) -> Option<Vec<ClassifiedReview>> {
        self.load(range, CacheStage::Classify)
    }

    pub fn store_classified(&self, range: &DateRange, classified: &[ClassifiedReview]) -> Result<(), CacheError> {
        self.store(range, CacheStage::Classify, classified)
    }

    /// Classified reviews saved by an interrupted run
    pub fn load_partial(&self, range: &DateRange) -> Option<Vec<ClassifiedReview>> {
        self.load(range, CacheStage::Partial)
    }

    pub fn store_partial(&self, range: &DateRange, classified: &[ClassifiedReview]) -> Result<(), CacheError> {
        self.store(range, CacheStage::Partial, classified)
    }

    pub fn clear_partial(&self, range: &DateRange) -> Result<(), CacheError> {
        let path = self.path_for(range, CacheStage::Partial);
        FileManager::remove_if_exists(&path).map_err(|e| io_error(&path, e))
    }

    fn load<T: DeserializeOwned>(&self, range: &DateRange, stage: CacheStage) -> Option<T> {
        let path = self.path_for(range, stage);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No {:?} snapshot at {:?}", stage, path);
                return None;
            }
            Err(e) => {
                warn!("Ignoring unreadable cache file {:?}: {}", path, e);
                return None;
            }
        };

        match decode(&content, range, stage) {
            Ok(payload) => {
                info!("Loaded cached {:?} snapshot from {:?}", stage, path);
                Some(payload)
            }
            Err(reason) => {
                warn!("Ignoring cache file {:?}: {}", path, reason);
                None
            }
        }
    }

    fn store<T: Serialize + ?Sized>(&self, range: &DateRange, stage: CacheStage, payload: &T) -> Result<(), CacheError> {
        let path = self.path_for(range, stage);
        let payload = serde_json::to_value(payload)?;
        let envelope = Envelope {
            version: CACHE_VERSION,
            range: range.key(),
            stage,
            checksum: checksum(&payload)?,
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        FileManager::write_atomic(&path, &bytes).map_err(|e| io_error(&path, e))?;
        debug!("Stored {:?} snapshot at {:?}", stage, path);
        Ok(())
    }
}

fn checksum(payload: &Value) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(payload)?;
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}

// Validate the envelope and decode its payload; the error is a log reason
fn decode<T: DeserializeOwned>(content: &str, range: &DateRange, stage: CacheStage) -> Result<T, String> {
    let envelope: Envelope<Value> = serde_json::from_str(content).map_err(|e| format!("not a cache envelope ({})", e))?;

    if envelope.version != CACHE_VERSION {
        return Err(format!("version {} (expected {})", envelope.version, CACHE_VERSION));
    }
    if envelope.range != range.key() {
        return Err(format!("written for {} instead of {}", envelope.range, range.key()));
    }
    if envelope.stage != stage {
        return Err(format!("holds {:?} instead of {:?}", envelope.stage, stage));
    }
    let actual = checksum(&envelope.payload).map_err(|e| e.to_string())?;
    if actual != envelope.checksum {
        return Err("checksum mismatch".to_string());
    }

    serde_json::from_value(envelope.payload).map_err(|e| format!("payload does not decode ({})", e))
}

fn io_error(path: &Path, error: anyhow::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source: io::Error::other(format!("{:#}", error)),
    }
}
