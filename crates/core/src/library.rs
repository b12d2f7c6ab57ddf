use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Reading progress for a library item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Unread,
    Reading,
    Read,
    Reference,
}

impl ReadingStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Reading => "reading",
            Self::Read => "read",
            Self::Reference => "reference",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "unread" => Ok(Self::Unread),
            "reading" => Ok(Self::Reading),
            "read" => Ok(Self::Read),
            "reference" => Ok(Self::Reference),
            other => Err(CoreError::UnknownVariant {
                kind: "reading status",
                value: other.to_owned(),
            }),
        }
    }
}

/// A bibliographic record for a book. Identity is `(title, author)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub publication_year: Option<i64>,
    pub isbn: Option<String>,
    /// Dewey decimal class, e.g. "005.133".
    pub dewey_decimal: Option<String>,
    pub cutter_number: Option<String>,
    pub call_number: Option<String>,
    pub reading_status: Option<ReadingStatus>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A bibliographic record for a paper. Identity is the DOI when present,
/// otherwise `(title, first_author, year)` compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: i64,
    pub title: String,
    pub first_author: Option<String>,
    pub year: Option<i64>,
    pub doi: Option<String>,
    /// UDC class, e.g. "004.8".
    pub udc_number: Option<String>,
    pub call_number: Option<String>,
    pub reading_status: Option<ReadingStatus>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Normalize a DOI for comparison: lowercase, no resolver prefix.
#[must_use]
pub fn normalize_doi(doi: &str) -> String {
    let trimmed = doi.trim().to_lowercase();
    for prefix in ["https://doi.org/", "http://doi.org/", "doi:"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.to_owned();
        }
    }
    trimmed
}
