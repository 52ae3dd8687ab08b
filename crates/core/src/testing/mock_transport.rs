//! Mock fetch transport for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::fetch::{FetchError, FetchTransport, Payload};

/// A scripted response for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// A small valid PDF served as `application/pdf`.
    Pdf,
    /// An HTML page (the usual "PDF link" that is really a landing page).
    Html,
    /// A `200` with no body.
    Empty,
    /// A non-success HTTP status.
    Status(u16),
    /// The request times out.
    Timeout,
    /// The connection is refused.
    Refused,
}

/// Mock implementation of the FetchTransport trait.
///
/// Replies are scripted per URL and consumed in order; the last scripted
/// reply repeats. Unscripted URLs serve [`MockReply::Pdf`].
///
/// # Example
///
/// ```rust,ignore
/// use harvest_core::testing::{MockReply, MockTransport};
///
/// let transport = MockTransport::new()
///     .with_replies("https://j.example/1.pdf", vec![MockReply::Status(503), MockReply::Pdf])
///     .with_delay(Duration::from_millis(10));
///
/// // ... run a pool against it ...
/// assert_eq!(transport.call_count("https://j.example/1.pdf"), 2);
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the active count even when the request future is dropped.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Body served for [`MockReply::Pdf`].
    pub const PDF_BODY: &'static [u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";

    pub fn new() -> Self {
        Self::default()
    }

    /// Script the replies for `url`.
    pub fn with_replies(self, url: &str, replies: Vec<MockReply>) -> Self {
        self.set_replies(url, replies);
        self
    }

    /// Delay every request by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the replies for `url`.
    pub fn set_replies(&self, url: &str, replies: Vec<MockReply>) {
        lock(&self.replies).insert(url.to_string(), replies.into());
    }

    /// Requests made for `url`.
    pub fn call_count(&self, url: &str) -> usize {
        lock(&self.calls).get(url).copied().unwrap_or_default()
    }

    /// Requests made in total.
    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Highest number of requests that were running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> MockReply {
        let mut replies = lock(&self.replies);
        match replies.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockReply::Pdf),
            Some(queue) => queue.front().cloned().unwrap_or(MockReply::Pdf),
            None => MockReply::Pdf,
        }
    }
}

#[async_trait]
impl FetchTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<Payload, FetchError> {
        *lock(&self.calls).entry(url.to_string()).or_default() += 1;
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let payload = |body: &[u8], content_type: &str| Payload {
            body: body.to_vec(),
            content_type: Some(content_type.to_string()),
            final_url: url.to_string(),
        };

        match self.next_reply(url) {
            MockReply::Pdf => Ok(payload(Self::PDF_BODY, "application/pdf")),
            MockReply::Html => Ok(payload(
                b"<html><body>Download</body></html>",
                "text/html; charset=utf-8",
            )),
            MockReply::Empty => Ok(payload(b"", "application/pdf")),
            MockReply::Status(status) => Err(FetchError::Http { status }),
            MockReply::Timeout => Err(FetchError::Timeout(timeout)),
            MockReply::Refused => Err(FetchError::Connect("connection refused".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_then_last_repeats() {
        let url = "https://j.example/1.pdf";
        let transport =
            MockTransport::new().with_replies(url, vec![MockReply::Status(503), MockReply::Status(404)]);
        let timeout = Duration::from_secs(1);

        assert!(matches!(
            transport.get(url, timeout).await,
            Err(FetchError::Http { status: 503 })
        ));
        assert!(matches!(
            transport.get(url, timeout).await,
            Err(FetchError::Http { status: 404 })
        ));
        assert!(matches!(
            transport.get(url, timeout).await,
            Err(FetchError::Http { status: 404 })
        ));
        assert_eq!(transport.call_count(url), 3);
    }

    #[tokio::test]
    async fn test_unscripted_url_serves_pdf() {
        let transport = MockTransport::new();
        let payload = transport
            .get("https://j.example/2.pdf", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(payload.body, MockTransport::PDF_BODY);
        assert_eq!(payload.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(transport.total_calls(), 1);
        assert_eq!(transport.peak_concurrency(), 1);
    }
}
