//! Testing utilities and mock implementations.
//!
//! Mock implementations of the feed, transport and store seams, so a whole
//! acquisition run can be exercised without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use harvest_core::testing::{fixtures, MemoryProgressStore, MockFeed, MockTransport};
//!
//! let feed = Arc::new(MockFeed::new(vec![(0..5).map(fixtures::record).collect()]));
//! let transport = Arc::new(MockTransport::new());
//! let store = Arc::new(MemoryProgressStore::new());
//!
//! let config = fixtures::config(dir.path());
//! let controller = AcquisitionController::new(config.clone(), feed, transport, store)
//!     .with_classifier(fixtures::classifier(&config));
//! ```

mod memory_store;
mod mock_feed;
mod mock_transport;

pub use memory_store::MemoryProgressStore;
pub use mock_feed::MockFeed;
pub use mock_transport::{MockReply, MockTransport};

use crate::classifier::{Detection, LanguageDetector};

/// Language detector that always returns the same guess.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    language: String,
    confidence: f64,
}

impl FixedDetector {
    pub fn new(language: &str, confidence: f64) -> Self {
        Self {
            language: language.to_string(),
            confidence,
        }
    }
}

impl LanguageDetector for FixedDetector {
    fn name(&self) -> &str {
        "fixed"
    }

    fn detect(&self, _text: &str) -> Option<Detection> {
        Some(Detection {
            language: self.language.clone(),
            confidence: self.confidence,
        })
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;
    use std::sync::Arc;

    use super::FixedDetector;
    use crate::classifier::Classifier;
    use crate::config::{Config, RetryConfig};
    use crate::record::{DownloadTask, NamingStrategy, Record, RecordId};

    /// Source reference of record `n`.
    pub fn source_url(n: u32) -> String {
        format!("https://doaj.org/article/{:08x}", n)
    }

    /// PDF reference of record `n`.
    pub fn pdf_url(n: u32) -> String {
        format!("https://jurnal.example/index.php/jk/article/download/{}/{}.pdf", n, n)
    }

    /// A record that passes classification.
    pub fn record(n: u32) -> Record {
        Record {
            journal_title: "Jurnal Kesehatan Masyarakat".to_string(),
            title: format!(
                "Hubungan status gizi dengan kejadian anemia pada remaja putri ({})",
                n
            ),
            authors: "Siti Rahmawati, Budi Santoso".to_string(),
            affiliation: "Fakultas Kesehatan Masyarakat, Universitas Airlangga".to_string(),
            abstract_text: "Penelitian ini bertujuan untuk mengetahui hubungan antara status \
                            gizi dengan kejadian anemia pada remaja putri. Desain penelitian \
                            adalah potong lintang dengan sampel siswi sekolah menengah. Hasil \
                            menunjukkan pentingnya pendidikan kesehatan dan gizi seimbang."
                .to_string(),
            source_url: source_url(n),
            pdf_url: Some(pdf_url(n)),
            landing_url: None,
        }
    }

    /// Identity of [`record`]`(n)`.
    pub fn record_id(n: u32) -> RecordId {
        RecordId::from_key(source_url(n))
    }

    /// Download task for [`record`]`(n)`, named with the default strategy.
    pub fn download_task(n: u32) -> DownloadTask {
        let record = record(n);
        let id = record_id(n);
        DownloadTask {
            file_name: NamingStrategy::default().file_name(&id, &record.title),
            pdf_url: pdf_url(n),
            id,
            record,
        }
    }

    /// Configuration rooted at `dir`, with fast retries.
    pub fn config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.run.target = 10;
        config.storage.index_path = dir.join("index.csv");
        config.storage.payload_dir = dir.join("payloads");
        config.storage.job_dir = dir.join("jobstate");
        config.fetch.concurrency = 4;
        config.fetch.timeout_secs = 5;
        config.fetch.drain_timeout_secs = 5;
        config.fetch.retry = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        };
        config.discovery.max_attempts = 3;
        config
    }

    /// Classifier that treats every abstract as Indonesian.
    pub fn classifier(config: &Config) -> Classifier {
        Classifier::with_detector(
            &config.classifier,
            Arc::new(FixedDetector::new("ind", 0.99)),
        )
    }
}
