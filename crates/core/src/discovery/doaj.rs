//! DOAJ article search adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::DiscoveryConfig;
use crate::record::{join_unique, normalize_spaces, Record};

use super::traits::DiscoveryFeed;
use super::types::{FeedCursor, FeedError, FeedPage};

const ARTICLE_PAGE: &str = "https://doaj.org/article/";

/// Walks the DOAJ search API, one paginated query after another.
///
/// Cursors have the form `<query index>:<page>`.
pub struct DoajFeed {
    client: Client,
    base_url: String,
    queries: Vec<String>,
    page_size: u32,
    timeout: Duration,
}

impl DoajFeed {
    pub fn new(config: &DiscoveryConfig, user_agent: &str) -> Result<Self, FeedError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            queries: config.queries.clone(),
            page_size: config.page_size.max(1),
            timeout,
        })
    }

    fn parse_cursor(&self, cursor: &FeedCursor) -> Result<(usize, u32), FeedError> {
        if cursor.is_start() {
            return Ok((0, 1));
        }
        let invalid = || FeedError::InvalidCursor(cursor.as_str().to_string());
        let (query, page) = cursor.as_str().split_once(':').ok_or_else(invalid)?;
        let query: usize = query.parse().map_err(|_| invalid())?;
        let page: u32 = page.parse().map_err(|_| invalid())?;
        if page == 0 {
            return Err(invalid());
        }
        Ok((query, page))
    }

    fn cursor(query: usize, page: u32) -> FeedCursor {
        FeedCursor::new(format!("{}:{}", query, page))
    }

    /// Cursor of the first page of the query after `query`, if any.
    fn next_query(&self, query: usize) -> Option<FeedCursor> {
        (query + 1 < self.queries.len()).then(|| Self::cursor(query + 1, 1))
    }

    /// Build the search URL for a query page.
    fn build_search_url(&self, query: &str, page: u32) -> String {
        format!(
            "{}/{}?page={}&pageSize={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query),
            page,
            self.page_size
        )
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FeedError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FeedError::Timeout(self.timeout)
            } else if e.is_connect() {
                FeedError::Connect(e.to_string())
            } else {
                FeedError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DiscoveryFeed for DoajFeed {
    fn name(&self) -> &str {
        "doaj"
    }

    async fn next_page(
        &self,
        cursor: &FeedCursor,
        cancel: &CancellationToken,
    ) -> Result<FeedPage, FeedError> {
        let (query_index, page) = self.parse_cursor(cursor)?;
        let Some(query) = self.queries.get(query_index) else {
            return Ok(FeedPage::default());
        };

        let url = self.build_search_url(query, page);
        debug!(query = %query, page, url = %url, "Fetching DOAJ page");

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FeedError::Cancelled),
            body = self.fetch_page(&url) => body,
        };

        let body = match body {
            Ok(body) => body,
            Err(e) if !e.is_retryable() && matches!(e, FeedError::Http { .. }) => {
                // Past the last page the API answers 400; any other permanent
                // status ends this query too.
                warn!(query = %query, page, "DOAJ page unavailable, moving to next query: {}", e);
                return Ok(FeedPage {
                    records: Vec::new(),
                    next: self.next_query(query_index),
                });
            }
            Err(e) => return Err(e),
        };

        let records = parse_search_page(&body)?;
        let next = if records.is_empty() {
            self.next_query(query_index)
        } else {
            Some(Self::cursor(query_index, page + 1))
        };

        Ok(FeedPage { records, next })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct Article {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    bibjson: BibJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BibJson {
    title: Value,
    #[serde(rename = "abstract")]
    abstract_text: Value,
    journal: Journal,
    author: Vec<Author>,
    link: Vec<Link>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Journal {
    title: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Author {
    name: Value,
    affiliation: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Link {
    #[serde(rename = "type")]
    link_type: Option<String>,
    url: Option<String>,
}

impl Link {
    fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    fn is_fulltext(&self) -> bool {
        self.link_type
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains("fulltext"))
    }
}

/// Parse a search response body into records. Malformed entries are skipped.
pub fn parse_search_page(body: &str) -> Result<Vec<Record>, FeedError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;

    let mut records = Vec::new();
    for value in response.results.unwrap_or_default() {
        match serde_json::from_value::<Article>(value) {
            Ok(article) => records.push(article.into_record()),
            Err(e) => debug!("Skipping malformed DOAJ record: {}", e),
        }
    }
    Ok(records)
}

/// First non-blank string of a string-or-list field, whitespace collapsed.
fn first_string(value: &Value) -> String {
    match value {
        Value::String(s) => normalize_spaces(s),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(normalize_spaces)
            .find(|s| !s.is_empty())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn ends_with_pdf(url: &str) -> bool {
    url.to_lowercase().ends_with(".pdf")
}

impl Article {
    fn into_record(self) -> Record {
        let bib = self.bibjson;

        let pdf_url = bib
            .link
            .iter()
            .filter(|l| l.is_fulltext())
            .filter_map(Link::url)
            .find(|u| ends_with_pdf(u))
            .or_else(|| bib.link.iter().filter_map(Link::url).find(|u| ends_with_pdf(u)))
            .map(String::from);

        let landing_url = bib
            .link
            .iter()
            .filter(|l| l.is_fulltext())
            .find_map(Link::url)
            .or_else(|| bib.link.iter().find_map(Link::url))
            .map(String::from);

        let source_url = match self.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => format!("{}{}", ARTICLE_PAGE, id),
            None => bib
                .link
                .iter()
                .find_map(Link::url)
                .unwrap_or_default()
                .to_string(),
        };

        Record {
            journal_title: first_string(&bib.journal.title),
            title: first_string(&bib.title),
            authors: join_unique(bib.author.iter().map(|a| first_string(&a.name)), ", "),
            affiliation: join_unique(bib.author.iter().map(|a| first_string(&a.affiliation)), "; "),
            abstract_text: first_string(&bib.abstract_text),
            source_url,
            pdf_url,
            landing_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "total": 2,
        "page": 1,
        "pageSize": 100,
        "results": [
            {
                "id": "abc123",
                "bibjson": {
                    "title": "  Status   Gizi Balita ",
                    "abstract": ["", "Penelitian tentang gizi."],
                    "journal": {"title": "Jurnal Gizi"},
                    "author": [
                        {"name": "Siti Aminah", "affiliation": "Universitas Indonesia"},
                        {"name": "Budi", "affiliation": "Universitas Indonesia"},
                        {"name": "Siti Aminah"}
                    ],
                    "link": [
                        {"type": "homepage", "url": "https://j.example/home.pdf"},
                        {"type": "fulltext", "url": "https://j.example/view/1"},
                        {"type": "fulltext", "url": "https://j.example/files/1.PDF"}
                    ]
                }
            },
            {
                "bibjson": {
                    "title": "Tanpa ID",
                    "link": [{"type": "fulltext", "url": "https://j.example/article/download/9"}]
                }
            },
            {"id": 42, "bibjson": "broken"}
        ]
    }"#;

    fn feed() -> DoajFeed {
        DoajFeed::new(&DiscoveryConfig::default(), "test-agent").unwrap()
    }

    #[test]
    fn test_parse_search_page() {
        let records = parse_search_page(PAGE).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.title, "Status Gizi Balita");
        assert_eq!(first.abstract_text, "Penelitian tentang gizi.");
        assert_eq!(first.journal_title, "Jurnal Gizi");
        assert_eq!(first.authors, "Siti Aminah, Budi");
        assert_eq!(first.affiliation, "Universitas Indonesia");
        assert_eq!(first.source_url, "https://doaj.org/article/abc123");
        assert_eq!(first.pdf_url.as_deref(), Some("https://j.example/files/1.PDF"));
        assert_eq!(first.landing_url.as_deref(), Some("https://j.example/view/1"));

        let second = &records[1];
        assert_eq!(second.source_url, "https://j.example/article/download/9");
        assert_eq!(second.pdf_url, None);
        assert_eq!(
            second.resolved_pdf_url(),
            Some("https://j.example/article/download/9")
        );
    }

    #[test]
    fn test_parse_empty_and_null_results() {
        assert!(parse_search_page(r#"{"results": []}"#).unwrap().is_empty());
        assert!(parse_search_page(r#"{"results": null}"#).unwrap().is_empty());
        assert!(parse_search_page(r#"{}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_search_page("{\"results\": ["),
            Err(FeedError::Decode(_))
        ));
    }

    #[test]
    fn test_build_search_url() {
        let url = feed().build_search_url("\"rumah sakit\"", 3);
        assert_eq!(
            url,
            "https://doaj.org/api/v2/search/articles/%22rumah%20sakit%22?page=3&pageSize=100"
        );
    }

    #[test]
    fn test_cursor_round_trip() {
        let feed = feed();
        assert_eq!(feed.parse_cursor(&FeedCursor::start()).unwrap(), (0, 1));
        assert_eq!(
            feed.parse_cursor(&DoajFeed::cursor(4, 7)).unwrap(),
            (4, 7)
        );
        assert!(feed.parse_cursor(&FeedCursor::new("x")).is_err());
        assert!(feed.parse_cursor(&FeedCursor::new("1:0")).is_err());
    }

    #[test]
    fn test_next_query_ends_after_last() {
        let feed = feed();
        assert_eq!(feed.next_query(0), Some(FeedCursor::new("1:1")));
        assert_eq!(feed.next_query(feed.queries.len() - 1), None);
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let feed = feed();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = feed
            .next_page(&FeedCursor::start(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Cancelled));
    }

    #[tokio::test]
    async fn test_cursor_past_last_query_is_end() {
        let feed = feed();
        let page = feed
            .next_page(&FeedCursor::new("99:1"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(page.records.is_empty());
        assert!(page.next.is_none());
    }
}
