//! Upstream feed response envelope.

use serde::Deserialize;

/// One page of the paginated circulars feed.
///
/// The portal answers each search request with a JSON envelope carrying the
/// result rows as an HTML fragment (`Htm`) and the number of rows still
/// available after this page (`Cnt`). Pagination continues while `Cnt > 0`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPage {
    /// Success flag
    #[serde(rename = "Status")]
    pub status: bool,

    /// Upstream status code
    #[serde(rename = "Data", default)]
    pub data: i64,

    /// Error text
    #[serde(rename = "Err", default)]
    pub err: String,

    /// Debug error text
    #[serde(rename = "Errdbg", default)]
    pub errdbg: String,

    /// HTML fragment with the result rows of this page
    #[serde(rename = "Htm", default)]
    pub htm: String,

    /// Number of rows available in the next request
    #[serde(rename = "Cnt", default)]
    pub cnt: i64,
}
