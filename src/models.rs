//! Data models passed between pipeline stages.
//!
//! Each stage hands the next one a typed value instead of a loose map:
//! - [`ArticleRef`]: a discovered article URL, produced by the listing scraper
//! - [`RawArticle`]: fetched bytes plus provenance, produced by the fetcher
//! - [`LakeObjectRef`]: durable handle to a raw article stored in the lake
//! - [`Record`]: the parsed article, the row that lands in the warehouse
//!
//! Identity flows through all of them: the `newsId` query parameter of the
//! source URL is the article id, from the fetch onwards.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::NewsIdError;

/// Name of the query parameter carrying the portal's article id.
pub const NEWS_ID_PARAM: &str = "newsId";

/// A discovered article URL. Has no identity until it is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRef {
    /// Absolute article URL.
    pub url: String,
}

/// Raw article bytes as fetched from the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArticle {
    /// The `newsId` of [`RawArticle::source_url`].
    pub id: i64,
    /// Response body, untouched.
    pub content: Vec<u8>,
    /// URL the bytes were fetched from.
    pub source_url: String,
    /// When the bytes were obtained. Carried verbatim through to the [`Record`].
    pub fetched_at: DateTime<Utc>,
}

/// Handle to a raw article persisted in the lake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LakeObjectRef {
    pub id: i64,
    pub storage_key: String,
    /// May be empty for handles rebuilt from a lake listing; the reader then
    /// recovers it from the object's metadata.
    pub source_url: String,
}

/// An image embedded in an article body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleImage {
    pub url: String,
    pub caption: String,
}

/// A structured article, keyed by `id` in the warehouse.
///
/// Re-crawling the same article produces a `Record` with the same `id`, which
/// overwrites the existing row rather than adding another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub title: String,
    pub subtitles: Vec<String>,
    pub publisher: String,
    pub body: String,
    pub images: Vec<ArticleImage>,
    /// Topical keywords from the article's structured data.
    pub tags: Vec<String>,
    pub source_url: String,
    pub published_at: DateTime<FixedOffset>,
    pub fetched_at: DateTime<Utc>,
}

/// Extract the article id from the `newsId` query parameter of `url`.
///
/// # Examples
///
/// ```ignore
/// let id = news_id_from_url("https://www.korea.kr/news/policyNewsView.do?newsId=148942535")?;
/// assert_eq!(id, 148942535);
/// ```
pub fn news_id_from_url(url: &str) -> Result<i64, NewsIdError> {
    let parsed = Url::parse(url).map_err(|e| NewsIdError::InvalidUrl(e.to_string()))?;
    let value = parsed
        .query_pairs()
        .find(|(key, _)| key == NEWS_ID_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or(NewsIdError::Missing)?;

    value
        .trim()
        .parse::<i64>()
        .map_err(|_| NewsIdError::NotNumeric(value))
}
