// src/services/feed.rs

//! Paginated feed retrieval.
//!
//! The portal returns circulars 100 rows at a time as JSON envelopes carrying
//! an HTML fragment payload. Pages are requested strictly sequentially so the
//! assembled corpus preserves upstream row order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::FeedPage;

/// Rows requested per page.
pub const PAGE_SIZE: u64 = 100;

/// Request timeout for a single page fetch.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Transport seam for the paginated feed endpoint.
///
/// The pagination loop only depends on this trait, so it can be exercised
/// against scripted pages without a network.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Fetch one page of the feed starting at `offset`.
    async fn fetch_page(&self, offset: u64) -> Result<FeedPage>;
}

/// HTTP transport backed by `reqwest`.
pub struct HttpFeed {
    client: Client,
    endpoint: Url,
}

impl HttpFeed {
    /// Create a transport with a configured client for the given endpoint.
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl FeedTransport for HttpFeed {
    async fn fetch_page(&self, offset: u64) -> Result<FeedPage> {
        let ls = offset.to_string();
        let form = [
            ("a", "akSEARCH"),
            ("field", "default"),
            ("search_term", ""),
            ("visua_storico", "false"),
            ("ls", ls.as_str()),
        ];

        let body = self
            .client
            .post(self.endpoint.clone())
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Accept-Charset", "UTF-8")
            .form(&form)
            .send()
            .await?
            .text()
            .await?;

        Ok(serde_json::from_str(&body)?)
    }
}

/// Retrieve every page of the feed and assemble the parseable corpus.
///
/// Fragments are concatenated in request order and wrapped in a minimal table
/// container. Any single request or decode failure aborts the whole fetch; no
/// partial corpus is returned.
pub async fn fetch_feed(transport: &dyn FeedTransport) -> Result<String> {
    let mut fragments = String::new();
    let mut offset = 0;

    loop {
        let page = transport.fetch_page(offset).await?;
        if !page.status {
            return Err(AppError::feed(
                page.data,
                format!("{} {}", page.err, page.errdbg).trim().to_string(),
            ));
        }

        fragments.push_str(&page.htm);
        if page.cnt <= 0 {
            break;
        }
        offset += PAGE_SIZE;
    }

    Ok(format!("<html><body><table>{fragments}</table></body></html>"))
}
