//! Error types for each pipeline stage.
//!
//! Errors are split along the two failure classes the pipeline cares about:
//!
//! - **Stage-fatal**: [`DiscoveryError`], bucket creation in [`LakeError`],
//!   connection/schema failures in [`WarehouseError`]. These surface through
//!   [`PipelineError`] and abort the run.
//! - **Item-local**: [`FetchError`], per-object [`LakeError`],
//!   [`ExtractionError`] and per-row [`WarehouseError`]. These are captured as
//!   `Result` outcomes at the batch boundary, logged, and the item is dropped.

use thiserror::Error;

/// Failure of a single HTTP exchange.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// The `newsId` query parameter could not be turned into an article id.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NewsIdError {
    #[error("url is not absolute or cannot be parsed: {0}")]
    InvalidUrl(String),

    #[error("newsId query parameter is missing")]
    Missing,

    #[error("newsId query parameter is not numeric: {0:?}")]
    NotNumeric(String),
}

/// Item-local failure while fetching one article page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot derive article id from {url}: {source}")]
    NewsId {
        url: String,
        #[source]
        source: NewsIdError,
    },

    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Fatal failure of listing discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("listing request failed on page {page}: {source}")]
    Http {
        page: u32,
        #[source]
        source: HttpError,
    },

    #[error("listing did not end within {max_pages} pages")]
    PageLimit { max_pages: u32 },

    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: String, end: String },
}

/// Object store failure.
#[derive(Debug, Error)]
pub enum LakeError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    #[error("invalid bucket name {0:?}")]
    InvalidBucket(String),

    #[error("corrupt metadata for {key}: {source}")]
    Metadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A raw document could not be turned into a [`crate::models::Record`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("article id: {0}")]
    NewsId(#[from] NewsIdError),

    #[error("mandatory element `{0}` is missing")]
    MissingElement(&'static str),

    #[error("embedded JSON-LD block is not valid JSON: {0}")]
    InvalidStructuredData(#[source] serde_json::Error),

    #[error("publication timestamp is missing")]
    MissingPublishedAt,

    #[error("publication timestamp {0:?} cannot be parsed")]
    InvalidPublishedAt(String),

    #[error("record id {found} does not match raw article id {expected}")]
    IdMismatch { expected: i64, found: i64 },
}

/// Relational store failure.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
}

/// Stage-fatal failure that aborts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("listing discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("lake unavailable: {0}")]
    Lake(#[from] LakeError),

    #[error("warehouse unavailable: {0}")]
    Warehouse(#[from] WarehouseError),
}
