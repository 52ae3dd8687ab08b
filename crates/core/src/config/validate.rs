use super::{types::Config, ConfigError};
use crate::record::NamingStrategy;

/// Validate configuration
/// Currently validates:
/// - run.target and fetch.concurrency are positive
/// - classifier language is a known ISO 639-3 code and confidence is within [0, 1]
/// - keyword and query lists are non-empty
/// - naming parameters are within range
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.run.target == 0 {
        return Err(invalid("run.target must be at least 1"));
    }

    if config.fetch.concurrency == 0 {
        return Err(invalid("fetch.concurrency must be at least 1"));
    }

    if config.fetch.retry.max_attempts == 0 {
        return Err(invalid("fetch.retry.max_attempts must be at least 1"));
    }

    if whatlang::Lang::from_code(config.classifier.language.as_str()).is_none() {
        return Err(invalid(format!(
            "classifier.language '{}' is not a recognized ISO 639-3 code",
            config.classifier.language
        )));
    }

    if !(0.0..=1.0).contains(&config.classifier.min_confidence) {
        return Err(invalid("classifier.min_confidence must be between 0.0 and 1.0"));
    }

    if config.classifier.keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(invalid("classifier.keywords cannot be empty"));
    }

    if let NamingStrategy::TitleSlug {
        hash_len,
        slug_max_len,
    } = config.storage.naming
    {
        if !(6..=64).contains(&hash_len) {
            return Err(invalid("storage.naming.hash_len must be between 6 and 64"));
        }
        if slug_max_len == 0 {
            return Err(invalid("storage.naming.slug_max_len must be at least 1"));
        }
    }

    if config.discovery.queries.is_empty() {
        return Err(invalid("discovery.queries cannot be empty"));
    }

    if config.discovery.page_size == 0 {
        return Err(invalid("discovery.page_size must be at least 1"));
    }

    if config.discovery.max_attempts == 0 {
        return Err(invalid("discovery.max_attempts must be at least 1"));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
