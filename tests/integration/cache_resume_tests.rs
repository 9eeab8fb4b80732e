/*!
 * Cache reuse and resumable classification across pipeline runs
 */

use std::fs;
use std::path::Path;

use anyhow::Result;
use reviewlens::aggregate::WeekDetail;
use reviewlens::app_config::Config;
use reviewlens::cache::{CacheStage, ReviewCache};
use reviewlens::date_range::DateRange;
use reviewlens::errors::{AppError, ConfigError, ProviderError};
use reviewlens::providers::RequestPurpose;
use reviewlens::providers::mock::MockProvider;
use reviewlens::reviews::Sentiment;
use reviewlens::{Pipeline, RunOutcome, RunRequest};

use crate::common::{self, scripted_answers};

fn week() -> DateRange {
    DateRange::parse("2024-01-01", "2024-01-07").unwrap()
}

fn request(dir: &Path, input: &Path) -> RunRequest {
    RunRequest {
        summary_file: dir.join("review-summary.json"),
        start_date: Some("2024-01-01".to_string()),
        end_date: Some("2024-01-07".to_string()),
        input: Some(input.to_path_buf()),
    }
}

/// Checkpoint after every review
fn checkpointing_config(dir: &Path) -> Config {
    let mut config = common::test_config(dir);
    config.progress_interval = 1;
    config
}

/// Three English reviews; the oldest one is classified last
fn create_resume_csv(dir: &Path) -> Result<std::path::PathBuf> {
    common::create_reviews_csv(
        dir,
        "reviews.csv",
        &[
            common::csv_row("en", "2024-01-06 10:00:00 UTC", 1, "Crash on launch", "https://play.example/a"),
            common::csv_row("en", "2024-01-05 10:00:00 UTC", 5, "Love it", "https://play.example/b"),
            common::csv_row("en", "2024-01-04 10:00:00 UTC", 2, "Key revoked, slow too", "https://play.example/c"),
        ],
    )
}

fn detail_ids(path: &Path) -> Result<Vec<String>> {
    let detail: WeekDetail = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(detail.reviews.into_iter().map(|r| r.id).collect())
}

/// First run on the sample week, then the fetched reviews are dropped from the cache
async fn run_sample_week_and_forget_reviews(dir: &Path, config: &Config) -> Result<()> {
    let input = common::create_sample_week_csv(dir)?;
    let (_mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::keyword_answers));
    Pipeline::new(config.clone(), Some(provider)).run(&request(dir, &input)).await?;

    let cache = ReviewCache::new(&config.paths.data_dir);
    fs::remove_file(cache.path_for(&week(), CacheStage::Reviews))?;
    fs::remove_file(dir.join("review-summary.json"))?;
    Ok(())
}

#[tokio::test]
async fn test_run_withReplacedBatch_shouldNotReuseOldClassifications() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config = common::test_config(temp_dir.path());
    run_sample_week_and_forget_reviews(temp_dir.path(), &config).await?;

    let input = common::create_reviews_csv(
        temp_dir.path(),
        "corrected.csv",
        &[
            common::csv_row("en", "2024-01-02 10:00:00 UTC", 5, "Love it", "https://play.example/n1"),
            common::csv_row("en", "2024-01-03 10:00:00 UTC", 1, "Crash on start", "https://play.example/n2"),
            common::csv_row("en", "2024-01-04 10:00:00 UTC", 2, "Pages are slow", "https://play.example/n3"),
            common::csv_row("en", "2024-01-05 10:00:00 UTC", 4, "Fine", "https://play.example/n4"),
        ],
    )?;
    let request = request(temp_dir.path(), &input);

    // Without a model the stale cache must not be passed off as the result
    let result = Pipeline::new(config.clone(), None).run(&request).await;
    assert!(matches!(result, Err(AppError::Config(ConfigError::MissingApiKey))));

    let (mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::keyword_answers));
    let outcome = Pipeline::new(config.clone(), Some(provider)).run(&request).await?;

    let RunOutcome::Completed { detail_file, entry, .. } = outcome else {
        panic!("run on the corrected batch did not complete");
    };
    assert_eq!(mock.requests_for(RequestPurpose::Classification).len(), 4);
    assert_eq!(entry.total_count, Some(4));
    assert_eq!(
        detail_ids(&detail_file)?,
        vec![
            "https://play.example/n4",
            "https://play.example/n3",
            "https://play.example/n2",
            "https://play.example/n1"
        ]
    );

    let cache = ReviewCache::new(&config.paths.data_dir);
    let classified = cache.load_classified(&week()).expect("classifications cached");
    assert!(classified.iter().all(|c| c.classification.review_id.contains("/n")));
    Ok(())
}

#[tokio::test]
async fn test_run_withOverlappingBatch_shouldClassifyOnlyNewReviews() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config = common::test_config(temp_dir.path());
    run_sample_week_and_forget_reviews(temp_dir.path(), &config).await?;

    // r2 is gone, r1 and r3 are unchanged, n1 is new
    let input = common::create_reviews_csv(
        temp_dir.path(),
        "corrected.csv",
        &[
            common::csv_row("en", "2024-01-02 09:15:00 UTC", 5, "Love it, fast and private", "https://play.example/r1"),
            common::csv_row("en", "2024-01-05 12:00:00 UTC", 1, "Crash when opening tabs", "https://play.example/n1"),
            common::csv_row("en", "2024-01-06 07:05:00 UTC", 2, "Pages are slow to load", "https://play.example/r3"),
        ],
    )?;

    let (mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::keyword_answers));
    let outcome = Pipeline::new(config, Some(provider)).run(&request(temp_dir.path(), &input)).await?;

    let RunOutcome::Completed { detail_file, .. } = outcome else {
        panic!("run on the overlapping batch did not complete");
    };
    let resent = mock.requests_for(RequestPurpose::Classification);
    assert_eq!(resent.len(), 1);
    assert!(resent[0].prompt.contains("Crash when opening tabs"));
    assert_eq!(
        detail_ids(&detail_file)?,
        vec!["https://play.example/r3", "https://play.example/n1", "https://play.example/r1"]
    );
    Ok(())
}

#[tokio::test]
async fn test_run_afterFatalError_shouldResumeFromCheckpoint() -> Result<()> {
    common::init_test_logger();
    let temp_dir = common::create_temp_dir()?;
    let input = create_resume_csv(temp_dir.path())?;
    let request = request(temp_dir.path(), &input);
    let config = checkpointing_config(temp_dir.path());

    let (first_mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::revoking_answers));
    let mut first = Pipeline::new(config.clone(), Some(provider));
    let result = first.run(&request).await;

    assert!(matches!(result, Err(AppError::Provider(ProviderError::AuthenticationError(_)))));
    assert_eq!(first_mock.requests_for(RequestPurpose::Classification).len(), 3);
    assert!(!request.summary_file.exists());

    let cache = ReviewCache::new(&config.paths.data_dir);
    let checkpoint = cache.load_partial(&week()).expect("checkpoint written");
    let done: Vec<&str> = checkpoint.iter().map(|c| c.review().id.as_str()).collect();
    assert_eq!(done, vec!["https://play.example/a", "https://play.example/b"]);

    let (second_mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::keyword_answers));
    let mut second = Pipeline::new(config, Some(provider));
    let outcome = second.run(&request).await?;

    let RunOutcome::Completed { entry, .. } = outcome else {
        panic!("resumed run did not complete");
    };
    // Only the review that failed is sent again
    let resent = second_mock.requests_for(RequestPurpose::Classification);
    assert_eq!(resent.len(), 1);
    assert!(resent[0].prompt.contains("Key revoked"));

    assert_eq!(entry.total_count, Some(3));
    assert_eq!(entry.positive_count, 1);
    assert_eq!(entry.negative_count, 2);
    assert!(!cache.path_for(&week(), CacheStage::Partial).exists());

    let classified = cache.load_classified(&week()).expect("classifications cached");
    let order: Vec<&str> = classified.iter().map(|c| c.review().id.as_str()).collect();
    assert_eq!(
        order,
        vec!["https://play.example/a", "https://play.example/b", "https://play.example/c"]
    );
    Ok(())
}

#[tokio::test]
async fn test_run_withForeignCheckpoint_shouldClassifyEverything() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = create_resume_csv(temp_dir.path())?;
    let config = checkpointing_config(temp_dir.path());
    let cache = ReviewCache::new(&config.paths.data_dir);
    cache.store_partial(
        &week(),
        &[common::classified_review("unrelated", 3, "Tabs", &["Tabs"], Sentiment::Negative)],
    )?;

    let (mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::keyword_answers));
    let mut pipeline = Pipeline::new(config, Some(provider));
    let outcome = pipeline.run(&request(temp_dir.path(), &input)).await?;

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(mock.requests_for(RequestPurpose::Classification).len(), 3);
    let classified = cache.load_classified(&week()).expect("classifications cached");
    assert!(classified.iter().all(|c| c.review().id != "unrelated"));
    Ok(())
}

/// A finished classification is reused without any API key
#[tokio::test]
async fn test_run_withCachedClassifications_shouldNotNeedProvider() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_week_csv(temp_dir.path())?;
    let request = request(temp_dir.path(), &input);
    let config = common::test_config(temp_dir.path());

    let (_mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::keyword_answers));
    Pipeline::new(config.clone(), Some(provider)).run(&request).await?;

    fs::remove_file(&request.summary_file)?;
    fs::remove_dir_all(temp_dir.path().join("results"))?;
    // Input is no longer needed either
    fs::remove_file(&input)?;

    let outcome = Pipeline::new(config, None).run(&request).await?;

    let RunOutcome::Completed { detail_file, entry, .. } = outcome else {
        panic!("cached run did not complete");
    };
    assert!(detail_file.is_file());
    assert_eq!(entry.total_count, Some(3));
    Ok(())
}

#[tokio::test]
async fn test_run_withTamperedReviewCache_shouldRefetch() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_week_csv(temp_dir.path())?;
    let request = request(temp_dir.path(), &input);
    let config = common::test_config(temp_dir.path());
    let cache = ReviewCache::new(&config.paths.data_dir);

    let (_mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::keyword_answers));
    Pipeline::new(config.clone(), Some(provider)).run(&request).await?;

    // Damage both snapshots and forget the week
    for stage in [CacheStage::Reviews, CacheStage::Classify] {
        let path = cache.path_for(&week(), stage);
        let damaged = fs::read_to_string(&path)?.replace("Pages are slow to load", "Pages are fast");
        fs::write(&path, damaged)?;
    }
    fs::remove_file(&request.summary_file)?;

    let (mock, provider) = common::shared_provider(MockProvider::scripted(scripted_answers::keyword_answers));
    let outcome = Pipeline::new(config, Some(provider)).run(&request).await?;

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(mock.requests_for(RequestPurpose::Classification).len(), 3);
    let reviews = cache.load_reviews(&week()).expect("reviews cached again");
    assert!(reviews.iter().any(|r| r.text == "Pages are slow to load"));
    Ok(())
}
