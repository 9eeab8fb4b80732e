/*!
 * Weekly batch pipeline.
 *
 * One run processes one date range through a straight-line state machine:
 *
 * `ResolveRange -> FetchOrLoadCache -> Translate -> ClassifyOrLoadCache -> Aggregate -> Persist -> Done`
 *
 * Every stage whose result is cached for the range is short-circuited. Any
 * error aborts the run before the summary file is written; partial progress
 * only ever reaches the cache directory.
 */

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::aggregate::{WeekDetail, WeekSummaryEntry, build_summary_entry, build_week_detail};
use crate::app_config::Config;
use crate::cache::ReviewCache;
use crate::classifier::Classifier;
use crate::date_range::DateRange;
use crate::errors::{AppError, ConfigError};
use crate::file_utils::FileManager;
use crate::providers::Provider;
use crate::retry::RequestGate;
use crate::reviews::{ClassifiedReview, Review, ensure_within_range, validate_rows};
use crate::sources::ReviewSource;
use crate::sources::bigquery::BigQuerySource;
use crate::sources::csv_file::CsvReviewSource;
use crate::summary::SummaryFile;
use crate::taxonomy::Taxonomy;
use crate::translator::Translator;

/// Stage of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    ResolveRange,
    FetchOrLoadCache,
    Translate,
    ClassifyOrLoadCache,
    Aggregate,
    Persist,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolveRange => "resolve range",
            Self::FetchOrLoadCache => "fetch reviews",
            Self::Translate => "translate",
            Self::ClassifyOrLoadCache => "classify",
            Self::Aggregate => "aggregate",
            Self::Persist => "persist",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What one invocation was asked to do
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Summary file to extend
    pub summary_file: PathBuf,
    /// Explicit range start, `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// Explicit range end, `YYYY-MM-DD`
    pub end_date: Option<String>,
    /// Local CSV to read instead of the warehouse
    pub input: Option<PathBuf>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Detail file written and a summary entry added
    Completed {
        range: DateRange,
        detail_file: PathBuf,
        entry: WeekSummaryEntry,
    },
    /// The range was already summarized; only the detail file was rewritten
    AlreadySummarized { range: DateRange, detail_file: PathBuf },
    /// Nothing to process for the range; nothing was written
    NoReviews { range: DateRange },
}

impl RunOutcome {
    pub fn range(&self) -> &DateRange {
        match self {
            Self::Completed { range, .. } | Self::AlreadySummarized { range, .. } | Self::NoReviews { range } => range,
        }
    }
}

/// Pipeline driver
pub struct Pipeline {
    // @field: Run configuration
    config: Config,
    taxonomy: Taxonomy,
    // @field: Language model; only required when classifications are not cached
    provider: Option<Arc<dyn Provider>>,
    // @field: Warehouse override, BigQuery when unset
    warehouse: Option<Arc<dyn ReviewSource>>,
    cache: ReviewCache,
    gate: Arc<RequestGate>,
    stage: PipelineStage,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: Config, provider: Option<Arc<dyn Provider>>) -> Self {
        Self {
            taxonomy: config.taxonomy(),
            cache: ReviewCache::new(&config.paths.data_dir),
            gate: Arc::new(RequestGate::from_config(&config.requests)),
            show_progress: config.show_progress,
            provider,
            warehouse: None,
            stage: PipelineStage::ResolveRange,
            config,
        }
    }

    /// Read reviews from this source instead of BigQuery
    pub fn with_warehouse(mut self, source: Arc<dyn ReviewSource>) -> Self {
        self.warehouse = Some(source);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn cache(&self) -> &ReviewCache {
        &self.cache
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!("Pipeline stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    /// Run the pipeline for one date range
    pub async fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, AppError> {
        let start_time = Instant::now();

        self.enter(PipelineStage::ResolveRange);
        let mut summary = SummaryFile::load(&request.summary_file)?;
        let range = summary.resolve_range(request.start_date.as_deref(), request.end_date.as_deref())?;
        let already_summarized = summary.contains(&range);
        if already_summarized {
            warn!(
                "{} already exists in {:?}; the detail file will be regenerated and the summary left unchanged",
                range,
                summary.path()
            );
        }
        info!("Using date range: {}", range);

        self.enter(PipelineStage::FetchOrLoadCache);
        let reviews = self.fetch_or_load(&range, request).await?;
        if reviews.is_empty() {
            warn!("No reviews to process for date range: {}", range);
            self.enter(PipelineStage::Done);
            return Ok(RunOutcome::NoReviews { range });
        }

        let classified = match self.cache.load_classified(&range) {
            Some(cached) => {
                info!("Loading cached classification data");
                let cached_count = cached.len();
                let reused = reuse_matching(cached, &reviews);
                if reused.len() == reviews.len() && cached_count == reviews.len() {
                    reused
                } else {
                    warn!(
                        "Cached classifications do not match the fetched reviews: {} of {} reusable, {} stale",
                        reused.len(),
                        reviews.len(),
                        cached_count - reused.len()
                    );
                    self.translate_and_classify(&range, &reviews, reused).await?
                }
            }
            None => {
                let resumed = self.resume_point(&range, &reviews);
                self.translate_and_classify(&range, &reviews, resumed).await?
            }
        };
        info!("Processing {} classified reviews", classified.len());

        self.enter(PipelineStage::Aggregate);
        let detail = build_week_detail(&range, &classified, &self.taxonomy);

        self.enter(PipelineStage::Persist);
        let detail_file = self.write_detail(&range, &detail)?;

        if already_summarized {
            self.enter(PipelineStage::Done);
            info!("Summary file {:?} unchanged", summary.path());
            return Ok(RunOutcome::AlreadySummarized { range, detail_file });
        }

        let mut entry = build_summary_entry(&range, &detail, Utc::now());
        let index = summary.insert(entry.clone());
        if let Some(stored) = summary.entries().get(index) {
            entry = stored.clone();
        }
        summary.save()?;
        info!(
            "New entry in summary file:\n{}",
            serde_json::to_string_pretty(&entry).unwrap_or_default()
        );

        self.enter(PipelineStage::Done);
        info!(
            "Successfully processed reviews for {} in {:.1}s",
            range,
            start_time.elapsed().as_secs_f64()
        );
        Ok(RunOutcome::Completed {
            range,
            detail_file,
            entry,
        })
    }

    fn select_source(&self, request: &RunRequest) -> Result<Arc<dyn ReviewSource>, AppError> {
        if let Some(input) = &request.input {
            return Ok(Arc::new(CsvReviewSource::new(input)));
        }
        if let Some(warehouse) = &self.warehouse {
            return Ok(Arc::clone(warehouse));
        }
        Ok(Arc::new(BigQuerySource::new(self.config.warehouse.clone())?))
    }

    /// Cached reviews for the range, or fetched, validated and cached ones
    async fn fetch_or_load(&self, range: &DateRange, request: &RunRequest) -> Result<Vec<Review>, AppError> {
        if let Some(reviews) = self.cache.load_reviews(range) {
            info!("Loading cached review data ({} reviews)", reviews.len());
            return Ok(reviews);
        }

        let source = self.select_source(request)?;
        info!("Fetching reviews for {} from {}", range, source.describe());
        let rows = source.fetch(&self.config.warehouse.package_names, range).await?;

        let mut reviews = validate_rows(rows);
        if reviews.is_empty() {
            return Ok(reviews);
        }
        ensure_within_range(&reviews, range)?;

        // Newest first; ties keep source order
        reviews.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        self.cache.store_reviews(range, &reviews)?;
        info!(
            "Cached {} reviews to {:?}",
            reviews.len(),
            self.cache.dir_for(range)
        );
        Ok(reviews)
    }

    /// Classified reviews saved by an interrupted run that still belong to this batch
    fn resume_point(&self, range: &DateRange, reviews: &[Review]) -> Vec<ClassifiedReview> {
        let Some(partial) = self.cache.load_partial(range) else {
            return Vec::new();
        };
        let saved = partial.len();
        let resumed = reuse_matching(partial, reviews);
        if resumed.len() < saved {
            warn!(
                "Discarding {} checkpointed classifications that do not match the fetched reviews",
                saved - resumed.len()
            );
        }
        if !resumed.is_empty() {
            info!(
                "Resuming classification from checkpoint: {}/{} reviews already done",
                resumed.len(),
                reviews.len()
            );
        }
        resumed
    }

    /// Classify every review of the batch that `done` does not already cover
    async fn translate_and_classify(
        &mut self,
        range: &DateRange,
        reviews: &[Review],
        mut done: Vec<ClassifiedReview>,
    ) -> Result<Vec<ClassifiedReview>, AppError> {
        let provider = self.provider.clone().ok_or(ConfigError::MissingApiKey)?;
        info!("Using {} provider for translation and classification", provider.name());
        let translator = Translator::new(Arc::clone(&provider), Arc::clone(&self.gate));
        let classifier = Classifier::new(provider, Arc::clone(&self.gate), self.taxonomy.clone(), self.config.app_name.clone());

        let covered: HashSet<String> = done.iter().map(|c| c.review().id.clone()).collect();
        let pending: Vec<&Review> = reviews.iter().filter(|r| !covered.contains(&r.id)).collect();
        let total = reviews.len();
        let interval = self.config.progress_interval.max(1);

        self.enter(PipelineStage::Translate);
        info!("Translating {} reviews where needed", pending.len());
        let progress_bar = self.progress_bar(pending.len() as u64, "Translating");
        let mut translated = Vec::with_capacity(pending.len());
        for review in pending {
            translated.push(translator.translate(review.clone()).await?);
            progress_bar.inc(1);
        }
        progress_bar.finish_and_clear();
        let untranslated = translated.iter().filter(|t| t.untranslated).count();
        if untranslated > 0 {
            warn!("{} reviews could not be translated and keep their original text", untranslated);
        }

        self.enter(PipelineStage::ClassifyOrLoadCache);
        info!("Starting classification of {} reviews", translated.len());
        let progress_bar = self.progress_bar(translated.len() as u64, "Classifying");
        for review in translated {
            let position = done.len() + 1;
            if position == 1 || position % interval == 0 {
                info!(
                    "Processing review {}/{} ({:.1}%)",
                    position,
                    total,
                    position as f64 * 100.0 / total as f64
                );
            }

            let classification = match classifier.classify(&review).await {
                Ok(classification) => classification,
                Err(e) => {
                    progress_bar.abandon();
                    self.cache.store_partial(range, &done)?;
                    return Err(e.into());
                }
            };
            done.push(ClassifiedReview {
                translated: review,
                classification,
            });
            progress_bar.inc(1);

            if done.len() % interval == 0 && done.len() < total {
                self.cache.store_partial(range, &done)?;
            }
        }
        progress_bar.finish_and_clear();

        sort_like_batch(&mut done, reviews);
        self.cache.store_classified(range, &done)?;
        self.cache.clear_partial(range)?;
        info!("Completed classification of {} reviews", done.len());
        Ok(done)
    }

    fn write_detail(&self, range: &DateRange, detail: &WeekDetail) -> Result<PathBuf, AppError> {
        let path = self.config.paths.results_dir.join(range.detail_file_name());
        info!("Writing results to {:?}", path);
        FileManager::write_json_atomic(&path, detail)?;
        Ok(path)
    }

    fn progress_bar(&self, len: u64, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} reviews ({percent}%) {msg} {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style);
        progress_bar.set_message(message);
        progress_bar
    }
}

/// Keep the classified reviews whose review is part of `reviews` unchanged, in batch order
fn reuse_matching(classified: Vec<ClassifiedReview>, reviews: &[Review]) -> Vec<ClassifiedReview> {
    let batch: HashMap<&str, &Review> = reviews.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut seen = HashSet::new();
    let mut kept: Vec<ClassifiedReview> = classified
        .into_iter()
        .filter(|c| batch.get(c.review().id.as_str()).is_some_and(|r| *r == c.review()))
        .filter(|c| seen.insert(c.review().id.clone()))
        .collect();
    sort_like_batch(&mut kept, reviews);
    kept
}

fn sort_like_batch(classified: &mut [ClassifiedReview], reviews: &[Review]) {
    let order: HashMap<&str, usize> = reviews.iter().enumerate().map(|(i, r)| (r.id.as_str(), i)).collect();
    classified.sort_by_key(|c| order.get(c.review().id.as_str()).copied().unwrap_or(usize::MAX));
}
