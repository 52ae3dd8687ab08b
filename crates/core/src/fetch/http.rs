//! reqwest-backed fetch transport.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::FetchConfig;

use super::traits::FetchTransport;
use super::types::{FetchError, Payload};

/// HTTP transport for PDF downloads.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else if error.is_connect() {
        FetchError::Connect(error.to_string())
    } else if error.is_body() || error.is_decode() {
        FetchError::Transfer(error.to_string())
    } else {
        FetchError::Request(error.to_string())
    }
}

#[async_trait]
impl FetchTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<Payload, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let final_url = response.url().to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, timeout))?;

        Ok(Payload {
            body: body.to_vec(),
            content_type,
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds_from_config() {
        let transport = HttpTransport::new(&FetchConfig::default()).unwrap();
        assert_eq!(transport.name(), "http");
    }

    #[tokio::test]
    async fn test_invalid_url_is_permanent() {
        let transport = HttpTransport::new(&FetchConfig::default()).unwrap();
        let err = transport
            .get("not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
        assert!(!err.is_retryable());
    }
}
