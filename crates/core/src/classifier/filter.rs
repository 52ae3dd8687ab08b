//! Language + topic + PDF availability filter.

use std::sync::Arc;

use crate::config::ClassifierConfig;
use crate::record::Record;

use super::detector::{LanguageDetector, WhatlangDetector};
use super::types::{RejectReason, Verdict};

/// Pure record filter. Holds only configuration; no state is touched by `classify`.
pub struct Classifier {
    language: String,
    min_confidence: f64,
    keywords: Vec<String>,
    detector: Arc<dyn LanguageDetector>,
}

impl Classifier {
    /// Create a classifier using the default language model.
    pub fn new(config: &ClassifierConfig) -> Self {
        Self::with_detector(config, Arc::new(WhatlangDetector))
    }

    /// Create a classifier with a custom language detector.
    pub fn with_detector(config: &ClassifierConfig, detector: Arc<dyn LanguageDetector>) -> Self {
        let keywords = config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            language: config.language.trim().to_lowercase(),
            min_confidence: config.min_confidence,
            keywords,
            detector,
        }
    }

    /// Decide whether a record becomes a download task.
    ///
    /// Checks run cheapest first; the language model only sees records that
    /// passed every other check.
    pub fn classify(&self, record: &Record) -> Verdict {
        if record.id().is_none() {
            return Verdict::Rejected(RejectReason::NoIdentity);
        }

        let title = record.title.trim();
        let abstract_text = record.abstract_text.trim();
        if title.is_empty() || abstract_text.is_empty() {
            return Verdict::Rejected(RejectReason::NoText);
        }

        if record.resolved_pdf_url().is_none() {
            return Verdict::Rejected(RejectReason::NoPdf);
        }

        if !self.matches_topic(title, abstract_text) {
            return Verdict::Rejected(RejectReason::Topic);
        }

        if !self.matches_language(abstract_text) {
            return Verdict::Rejected(RejectReason::Language);
        }

        Verdict::Accepted
    }

    fn matches_topic(&self, title: &str, abstract_text: &str) -> bool {
        let haystack = format!("{} {}", title, abstract_text).to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }

    fn matches_language(&self, abstract_text: &str) -> bool {
        match self.detector.detect(abstract_text) {
            Some(detection) => {
                detection.language == self.language && detection.confidence > self.min_confidence
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Detection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Detector returning a fixed answer and counting calls.
    struct FixedDetector {
        detection: Option<Detection>,
        calls: AtomicUsize,
    }

    impl FixedDetector {
        fn new(language: &str, confidence: f64) -> Arc<Self> {
            Arc::new(Self {
                detection: Some(Detection {
                    language: language.to_string(),
                    confidence,
                }),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl LanguageDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _text: &str) -> Option<Detection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.detection.clone()
        }
    }

    fn record() -> Record {
        Record {
            journal_title: "Jurnal Kesehatan".to_string(),
            title: "Status Gizi Balita".to_string(),
            authors: "Siti Aminah".to_string(),
            affiliation: "Universitas Indonesia".to_string(),
            abstract_text: "Penelitian tentang kesehatan anak dan gizi.".to_string(),
            source_url: "https://doaj.org/article/1".to_string(),
            pdf_url: Some("https://journal.example/1.pdf".to_string()),
            landing_url: None,
        }
    }

    fn classifier(detector: Arc<dyn LanguageDetector>) -> Classifier {
        Classifier::with_detector(&ClassifierConfig::default(), detector)
    }

    #[test]
    fn test_accepts_matching_record() {
        let c = classifier(FixedDetector::new("ind", 0.9));
        assert_eq!(c.classify(&record()), Verdict::Accepted);
    }

    #[test]
    fn test_rejects_empty_abstract() {
        let c = classifier(FixedDetector::new("ind", 0.9));
        let mut r = record();
        r.abstract_text = "   ".to_string();
        assert_eq!(c.classify(&r), Verdict::Rejected(RejectReason::NoText));
    }

    #[test]
    fn test_rejects_missing_pdf() {
        let c = classifier(FixedDetector::new("ind", 0.9));
        let mut r = record();
        r.pdf_url = None;
        r.landing_url = Some("https://journal.example/view/1".to_string());
        assert_eq!(c.classify(&r), Verdict::Rejected(RejectReason::NoPdf));
    }

    #[test]
    fn test_accepts_derivable_pdf() {
        let c = classifier(FixedDetector::new("ind", 0.9));
        let mut r = record();
        r.pdf_url = None;
        r.landing_url = Some("https://journal.example/article/download/1/2".to_string());
        assert!(c.classify(&r).is_accepted());
    }

    #[test]
    fn test_rejects_off_topic() {
        let c = classifier(FixedDetector::new("ind", 0.9));
        let mut r = record();
        r.title = "Analisis Ekonomi".to_string();
        r.abstract_text = "Studi tentang pasar saham.".to_string();
        assert_eq!(c.classify(&r), Verdict::Rejected(RejectReason::Topic));
    }

    #[test]
    fn test_keyword_match_is_case_insensitive_and_uses_title() {
        let c = classifier(FixedDetector::new("ind", 0.9));
        let mut r = record();
        r.title = "RUMAH SAKIT Umum Daerah".to_string();
        r.abstract_text = "Studi deskriptif.".to_string();
        assert!(c.classify(&r).is_accepted());
    }

    #[test]
    fn test_rejects_other_language() {
        let c = classifier(FixedDetector::new("eng", 0.99));
        assert_eq!(c.classify(&record()), Verdict::Rejected(RejectReason::Language));
    }

    #[test]
    fn test_rejects_low_confidence() {
        let c = classifier(FixedDetector::new("ind", 0.2));
        assert_eq!(c.classify(&record()), Verdict::Rejected(RejectReason::Language));
    }

    #[test]
    fn test_confidence_must_exceed_threshold() {
        let c = classifier(FixedDetector::new("ind", 0.5));
        assert_eq!(c.classify(&record()), Verdict::Rejected(RejectReason::Language));
        let c = classifier(FixedDetector::new("ind", 0.51));
        assert!(c.classify(&record()).is_accepted());
    }

    #[test]
    fn test_rejects_missing_identity() {
        let c = classifier(FixedDetector::new("ind", 0.9));
        let mut r = record();
        r.source_url = String::new();
        r.pdf_url = None;
        r.landing_url = None;
        assert_eq!(c.classify(&r), Verdict::Rejected(RejectReason::NoIdentity));
    }

    #[test]
    fn test_detector_skipped_when_cheaper_check_fails() {
        let detector = FixedDetector::new("ind", 0.9);
        let c = classifier(detector.clone());
        let mut r = record();
        r.abstract_text = "Studi tentang pasar saham.".to_string();
        r.title = "Ekonomi".to_string();
        c.classify(&r);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_classify_is_repeatable() {
        let c = classifier(FixedDetector::new("ind", 0.9));
        let r = record();
        let first = c.classify(&r);
        for _ in 0..5 {
            assert_eq!(c.classify(&r), first);
        }
    }
}
