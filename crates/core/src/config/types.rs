use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::record::NamingStrategy;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Run-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Number of successful downloads that ends the run.
    #[serde(default = "default_target")]
    pub target: u64,
    /// Start over when the index file is unreadable instead of aborting.
    #[serde(default)]
    pub fresh: bool,
    /// Re-submit identities whose last outcome was `failed` before discovery resumes.
    #[serde(default = "default_true")]
    pub retry_failed: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            fresh: false,
            retry_failed: true,
        }
    }
}

fn default_target() -> u64 {
    450
}

fn default_true() -> bool {
    true
}

/// Classifier settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// ISO 639-3 code of the language to keep (e.g. "ind").
    #[serde(default = "default_language")]
    pub language: String,
    /// Detector confidence must exceed this (0.0-1.0).
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Topic keywords, matched case-insensitively against title + abstract.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            min_confidence: default_min_confidence(),
            keywords: default_keywords(),
        }
    }
}

fn default_language() -> String {
    "ind".to_string()
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_keywords() -> Vec<String> {
    [
        "kesehatan",
        "medis",
        "kedokteran",
        "keperawatan",
        "farmasi",
        "kesehatan masyarakat",
        "gizi",
        "klinis",
        "rumah sakit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Fetch worker pool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Maximum concurrent downloads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Total time allowed for a single attempt (connect + transfer), in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// How long in-flight downloads may keep running after the run halts, in seconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_fetch_timeout(),
            drain_timeout_secs: default_drain_timeout(),
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_fetch_timeout() -> u64 {
    25
}

fn default_drain_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("pdfharvest/{}", env!("CARGO_PKG_VERSION"))
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum attempts per download, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Backoff delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> std::time::Duration {
        let exp = retry.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exp);
        let capped = millis.min(self.max_delay_ms as f64).max(0.0);
        std::time::Duration::from_millis(capped as u64)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    8_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// On-disk locations and naming
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Progress index (CSV).
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    /// Root directory for downloaded payloads.
    #[serde(default = "default_payload_dir")]
    pub payload_dir: PathBuf,
    /// Directory holding the discovery resume cursor.
    #[serde(default = "default_job_dir")]
    pub job_dir: PathBuf,
    /// Write `rejected` rows for classifier rejections.
    #[serde(default)]
    pub record_rejections: bool,
    /// Filename strategy for payloads.
    #[serde(default)]
    pub naming: NamingStrategy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            payload_dir: default_payload_dir(),
            job_dir: default_job_dir(),
            record_rejections: false,
            naming: NamingStrategy::default(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("jurnal_kesehatan_indonesia.csv")
}

fn default_payload_dir() -> PathBuf {
    PathBuf::from("downloaded_pdfs")
}

fn default_job_dir() -> PathBuf {
    PathBuf::from("jobstate")
}

/// DOAJ discovery feed settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Search endpoint; the encoded query is appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Queries walked in order, each paginated to exhaustion.
    #[serde(default = "default_queries")]
    pub queries: Vec<String>,
    /// Results per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Attempts per page before the feed is given up on.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            queries: default_queries(),
            page_size: default_page_size(),
            timeout_secs: default_fetch_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_url() -> String {
    "https://doaj.org/api/v2/search/articles/".to_string()
}

fn default_queries() -> Vec<String> {
    [
        "kesehatan",
        "kedokteran",
        "keperawatan",
        "farmasi",
        "gizi",
        "klinis",
        "medis",
        "\"kesehatan masyarakat\"",
        "\"rumah sakit\"",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_page_size() -> u32 {
    100
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.run.target, 450);
        assert!(config.run.retry_failed);
        assert_eq!(config.classifier.language, "ind");
        assert_eq!(config.classifier.keywords.len(), 9);
        assert_eq!(config.fetch.concurrency, 8);
        assert_eq!(
            config.storage.index_path.to_str().unwrap(),
            "jurnal_kesehatan_indonesia.csv"
        );
        assert_eq!(config.discovery.page_size, 100);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_deserialize_overrides() {
        let toml = r#"
[run]
target = 800

[fetch]
concurrency = 3

[fetch.retry]
max_attempts = 5

[storage]
payload_dir = "/data/pdfs"

[storage.naming]
strategy = "hash"

[logging]
format = "json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.run.target, 800);
        assert_eq!(config.fetch.concurrency, 3);
        assert_eq!(config.fetch.retry.max_attempts, 5);
        assert_eq!(config.fetch.retry.initial_delay_ms, 500);
        assert_eq!(config.storage.payload_dir.to_str().unwrap(), "/data/pdfs");
        assert_eq!(config.storage.naming, NamingStrategy::Hash);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_retry_delay_is_exponential_and_capped() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 350,
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.delay_for(1).as_millis(), 100);
        assert_eq!(retry.delay_for(2).as_millis(), 200);
        assert_eq!(retry.delay_for(3).as_millis(), 350);
        assert_eq!(retry.delay_for(10).as_millis(), 350);
    }
}
