//! HTTP client for the public procurement open-data API: request building,
//! response envelope handling, and the numbered-page window fetch loop.
//!
//! The remote contract is a paged query with an API key, page number, fixed
//! page size, a query-mode flag, and a `YYYYMMDDHHMM` begin/end timestamp
//! pair; responses nest the item list under `response.body.items`. One poll
//! is a single sequential best-effort pass: no retries, no parallel pages.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info};

pub const CRATE_NAME: &str = "bidwatch-client";

/// Page size the upstream service expects (`numOfRows`).
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Query-mode flag the upstream expects (`inqryDiv`).
pub const DEFAULT_QUERY_MODE: u32 = 1;

/// Inclusive time window for one poll, both bounds in `YYYYMMDDHHMM` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    pub begin: String,
    pub end: String,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    pub service_key: String,
    pub page_size: u32,
    pub query_mode: u32,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl EndpointConfig {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            service_key: service_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
            query_mode: DEFAULT_QUERY_MODE,
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response envelope on page {page_no}: {detail}; response snippet: {snippet}")]
    Envelope {
        page_no: u32,
        detail: String,
        snippet: String,
    },
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    response: Option<EnvelopeResponse>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeResponse {
    body: Option<EnvelopeBody>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBody {
    #[serde(default)]
    items: Option<JsonValue>,
}

fn snippet_of(body: &str) -> String {
    body.chars().take(240).collect()
}

/// Extract the item list from one page's response body.
///
/// `items` absent, null, or an empty string all mean "no items on this page"
/// (the upstream serializes an empty result as `"items": ""`); a missing
/// `response`/`body` layer or a non-array payload is an envelope error.
pub fn parse_items(page_no: u32, body: &str) -> Result<Vec<JsonValue>, ClientError> {
    let envelope: ApiEnvelope = serde_json::from_str(body).map_err(|err| ClientError::Envelope {
        page_no,
        detail: err.to_string(),
        snippet: snippet_of(body),
    })?;

    let inner = envelope
        .response
        .and_then(|r| r.body)
        .ok_or_else(|| ClientError::Envelope {
            page_no,
            detail: "missing response.body".to_string(),
            snippet: snippet_of(body),
        })?;

    match inner.items {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => Ok(items),
        Some(other) => Err(ClientError::Envelope {
            page_no,
            detail: format!("response.body.items is not an array: {other}"),
            snippet: snippet_of(body),
        }),
    }
}

/// Seam between the page loop and the transport, so poll cycles can be
/// exercised against scripted pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        window: &QueryWindow,
        page_no: u32,
    ) -> Result<Vec<JsonValue>, ClientError>;
}

/// reqwest-backed fetcher for one upstream endpoint.
#[derive(Debug)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    config: EndpointConfig,
}

impl HttpPageFetcher {
    pub fn new(config: EndpointConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(
        &self,
        window: &QueryWindow,
        page_no: u32,
    ) -> Result<Vec<JsonValue>, ClientError> {
        let params = [
            ("serviceKey", self.config.service_key.clone()),
            ("pageNo", page_no.to_string()),
            ("numOfRows", self.config.page_size.to_string()),
            ("inqryDiv", self.config.query_mode.to_string()),
            ("type", "json".to_string()),
            ("bidNtceBgnDt", window.begin.clone()),
            ("bidNtceEndDt", window.end.clone()),
        ];

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        parse_items(page_no, &body)
    }
}

/// Everything one window fetch produced. Pages preserve server order; only
/// non-empty pages are kept. A transport/envelope failure truncates the loop
/// but the pages collected before it survive here.
#[derive(Debug)]
pub struct WindowFetch {
    pub pages: Vec<Vec<JsonValue>>,
    pub error: Option<ClientError>,
}

impl WindowFetch {
    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &JsonValue> {
        self.pages.iter().flatten()
    }

    pub fn flattened(&self) -> Vec<JsonValue> {
        self.items().cloned().collect()
    }

    /// Last item of the last non-empty page; the watermark advancement input.
    pub fn last_item(&self) -> Option<&JsonValue> {
        self.pages.last().and_then(|page| page.last())
    }

    pub fn is_truncated(&self) -> bool {
        self.error.is_some()
    }
}

/// Walk numbered pages from 1 until the first empty page or the first
/// failure. Server order is trusted as-is.
pub async fn fetch_window(fetcher: &dyn PageFetcher, window: &QueryWindow) -> WindowFetch {
    let mut pages = Vec::new();
    let mut page_no = 1u32;

    loop {
        match fetcher.fetch_page(window, page_no).await {
            Ok(items) if items.is_empty() => {
                info!(page_no, "no more items");
                break;
            }
            Ok(items) => {
                info!(page_no, count = items.len(), "page received");
                pages.push(items);
                page_no += 1;
            }
            Err(err) => {
                error!(
                    page_no,
                    error = %err,
                    collected = pages.iter().map(Vec::len).sum::<usize>(),
                    "page fetch failed; keeping pages already collected"
                );
                return WindowFetch {
                    pages,
                    error: Some(err),
                };
            }
        }
    }

    WindowFetch { pages, error: None }
}
