/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use reviewlens::app_config::{Config, LogLevel};
use reviewlens::taxonomy::{CategoryDefinition, OTHER, SATISFIED};

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.model.model, "gpt-4o");
    assert_eq!(config.requests.rate_limit_delay_ms, 500);
    assert_eq!(config.requests.retry_count, 3);
    assert_eq!(config.requests.retry_backoff_ms, 2000);
    assert_eq!(config.warehouse.project, "mozdata");
    assert_eq!(config.warehouse.dataset, "google_play_store");
    assert_eq!(
        config.warehouse.package_names,
        vec!["org.mozilla.firefox", "org.mozilla.firefox_beta", "org.mozilla.fenix"]
    );
    assert_eq!(config.categories.len(), 27);
    assert_eq!(config.progress_interval, 10);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.validate().is_ok());
}

/// A partial file only overrides what it names
#[test]
fn test_load_or_default_withPartialFile_shouldKeepOtherDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "reviewlens.json",
        r#"{ "model": { "model": "gpt-4o-mini" }, "requests": { "retry_count": 5 }, "log_level": "debug" }"#,
    )?;

    let config = Config::load_or_default(&path)?;
    assert_eq!(config.model.model, "gpt-4o-mini");
    assert_eq!(config.model.endpoint, "https://api.openai.com/v1");
    assert_eq!(config.requests.retry_count, 5);
    assert_eq!(config.requests.rate_limit_delay_ms, 500);
    assert_eq!(config.log_level, LogLevel::Debug);
    Ok(())
}

#[test]
fn test_load_or_default_withMissingFile_shouldUseDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config = Config::load_or_default(&temp_dir.path().join("absent.json"))?;
    assert_eq!(config.model.model, "gpt-4o");
    Ok(())
}

#[test]
fn test_load_or_default_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "reviewlens.json", "{ not json")?;
    assert!(Config::load_or_default(&path).is_err());
    Ok(())
}

#[test]
fn test_apply_overrides_from_withKeys_shouldSetCredentials() {
    let mut config = Config::default();
    assert!(!config.has_api_key());

    config.apply_overrides_from(|name| match name {
        "OPENAI_API_KEY" => Some(" sk-test ".to_string()),
        "BIGQUERY_ACCESS_TOKEN" => Some("ya29.token".to_string()),
        _ => None,
    });

    assert!(config.has_api_key());
    assert_eq!(config.model.api_key, "sk-test");
    assert_eq!(config.warehouse.access_token, "ya29.token");
}

#[test]
fn test_apply_overrides_from_withBlankKey_shouldKeepConfigured() {
    let mut config = Config::default();
    config.model.api_key = "sk-from-file".to_string();
    config.apply_overrides_from(|_| Some("   ".to_string()));
    assert_eq!(config.model.api_key, "sk-from-file");
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    config.categories.retain(|c| c.name != OTHER);
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.categories.retain(|c| c.name != SATISFIED);
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.categories.push(CategoryDefinition::new("crash", "duplicate in another case"));
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.requests.retry_count = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.progress_interval = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.warehouse.package_names.clear();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.categories.clear();
    assert!(config.validate().is_err());
}

/// A custom taxonomy replaces the default one
#[test]
fn test_taxonomy_withCustomCategories_shouldFollowConfig() {
    let mut config = Config::default();
    config.categories = vec![
        CategoryDefinition::new("Crash", "Crashes"),
        CategoryDefinition::new(SATISFIED, "Happy"),
        CategoryDefinition::new(OTHER, "Anything else"),
    ];
    assert!(config.validate().is_ok());

    let taxonomy = config.taxonomy();
    assert_eq!(taxonomy.names().collect::<Vec<_>>(), vec!["Crash", SATISFIED, OTHER]);
    assert!(!taxonomy.contains("Slow"));
}
