//! Circular and attachment records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An official announcement published on the school portal.
///
/// Identifiers are assigned upstream and never generated locally. A circular
/// missing any mandatory field is discarded during extraction and never
/// constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Circular {
    /// Upstream document identifier (`id_doc` of the download marker)
    pub id: u64,

    /// Announcement title, never empty
    pub title: String,

    /// Category label
    pub category: String,

    /// Publication date, day granularity
    pub published_on: NaiveDate,

    /// Last day of validity
    pub valid_until: NaiveDate,

    /// File references owned by this circular, in source order
    pub attachments: Vec<Attachment>,
}

/// A file reference owned by exactly one circular.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Upstream document identifier of the file
    pub id: u64,

    /// Visible link text
    pub title: String,
}
