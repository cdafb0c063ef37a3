//! The data lake: raw article pages persisted as objects.
//!
//! Raw HTML is written once per fetch and can be read back any number of
//! times, so parsing can be re-run without touching the portal again.
//!
//! # Object layout
//!
//! ```text
//! {bucket}/
//! └── 2025/
//!     └── 07/
//!         └── 14/
//!             ├── 148942535_093012.html
//!             └── 148942536_093012.html
//! ```
//!
//! Keys are partitioned by *write* time, not by publication time. Re-running a
//! crawl therefore creates new objects next to the old ones; the warehouse row
//! is what stays authoritative.
//!
//! # Metadata
//!
//! | key | value |
//! |-----|-------|
//! | `crawled_at` | fetch timestamp, RFC 3339 UTC with microseconds |
//! | `news_id` | article id |
//! | `source_url` | URL the page was fetched from |

pub mod fs;
#[cfg(test)]
pub mod memory;

use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::{BatchSettings, run_batched, split_outcomes};
use crate::error::LakeError;
use crate::models::{LakeObjectRef, RawArticle};

/// Metadata key holding the fetch timestamp.
pub const CRAWLED_AT_KEY: &str = "crawled_at";
/// Metadata key holding the article id.
pub const NEWS_ID_KEY: &str = "news_id";
/// Metadata key holding the source URL.
pub const SOURCE_URL_KEY: &str = "source_url";
/// Content type recorded for raw pages.
pub const HTML_CONTENT_TYPE: &str = "text/html";

/// An object as stored in the lake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

/// Key-value object storage with user metadata.
pub trait ObjectStore {
    /// Create `bucket` if it does not exist. Concurrent callers must all succeed.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), LakeError>;

    /// Write `object` under `key`, replacing any previous object.
    async fn put_object(&self, bucket: &str, key: &str, object: StoredObject) -> Result<(), LakeError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, LakeError>;

    /// Keys in `bucket` starting with `prefix`, sorted.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, LakeError>;
}

/// Storage key for article `id` written at `written_at`.
///
/// # Examples
///
/// ```ignore
/// // 2025-07-04T09:05:03Z
/// assert_eq!(storage_key(42, written_at), "2025/07/04/42_090503.html");
/// ```
pub fn storage_key(id: i64, written_at: DateTime<Utc>) -> String {
    format!(
        "{}/{}_{}.html",
        written_at.format("%Y/%m/%d"),
        id,
        written_at.format("%H%M%S")
    )
}

/// Recover the article id from a key produced by [`storage_key`].
pub fn parse_storage_key(key: &str) -> Option<i64> {
    let file = key.rsplit('/').next()?;
    let stem = file.strip_suffix(".html")?;
    let (id, time) = stem.split_once('_')?;
    if time.len() != 6 || !time.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// Canonical text encoding of a fetch timestamp.
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`encode_timestamp`]. Any RFC 3339 offset is accepted.
pub fn decode_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Source of "now" for the lake. Swappable so tests can pin time.
pub type Clock = fn() -> DateTime<Utc>;

/// Persists fetched pages into one bucket.
#[derive(Debug)]
pub struct LakeWriter<'a, S> {
    store: &'a S,
    bucket: &'a str,
    clock: Clock,
}

impl<'a, S: ObjectStore> LakeWriter<'a, S> {
    pub fn new(store: &'a S, bucket: &'a str) -> Self {
        Self {
            store,
            bucket,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Write every raw article and return handles for the ones that landed.
    ///
    /// Failing to create the bucket aborts the stage. Individual write
    /// failures are logged and left out of the result.
    ///
    /// # Arguments
    ///
    /// * `raws` - Fetched pages to persist
    /// * `settings` - Batch size; writes are normally unpaced
    ///
    /// # Returns
    ///
    /// A handle per stored object, in input order.
    #[instrument(level = "info", skip_all, fields(bucket = %self.bucket, total = raws.len()))]
    pub async fn write_all(
        &self,
        raws: &[RawArticle],
        settings: &BatchSettings,
    ) -> Result<Vec<LakeObjectRef>, LakeError> {
        self.store.ensure_bucket(self.bucket).await?;

        let outcomes = run_batched("lake_write", raws, settings, |raw| async move {
            let result = self.write_one(raw).await;
            if let Err(e) = &result {
                error!(id = raw.id, error = %e, "Failed to write raw article to lake");
            }
            result
        })
        .await;

        let (written, failed) = split_outcomes(outcomes);
        if failed.is_empty() {
            info!(written = written.len(), "Stored raw articles in lake");
        } else {
            warn!(
                written = written.len(),
                failed = failed.len(),
                "Some raw articles were not stored"
            );
        }
        Ok(written)
    }

    async fn write_one(&self, raw: &RawArticle) -> Result<LakeObjectRef, LakeError> {
        let key = storage_key(raw.id, (self.clock)());
        let metadata = BTreeMap::from([
            (CRAWLED_AT_KEY.to_string(), encode_timestamp(raw.fetched_at)),
            (NEWS_ID_KEY.to_string(), raw.id.to_string()),
            (SOURCE_URL_KEY.to_string(), raw.source_url.clone()),
        ]);
        let object = StoredObject {
            content: raw.content.clone(),
            content_type: HTML_CONTENT_TYPE.to_string(),
            metadata,
        };

        self.store.put_object(self.bucket, &key, object).await?;
        info!(id = raw.id, %key, "Wrote raw article");

        Ok(LakeObjectRef {
            id: raw.id,
            storage_key: key,
            source_url: raw.source_url.clone(),
        })
    }
}

/// Reads raw pages back out of one bucket.
#[derive(Debug)]
pub struct LakeReader<'a, S> {
    store: &'a S,
    bucket: &'a str,
    clock: Clock,
}

impl<'a, S: ObjectStore> LakeReader<'a, S> {
    pub fn new(store: &'a S, bucket: &'a str) -> Self {
        Self {
            store,
            bucket,
            clock: Utc::now,
        }
    }

    /// Use `clock` for the `fetched_at` fallback instead of the system time.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Handles for the objects under `prefix` whose key carries an article id.
    ///
    /// An article written more than once (a re-run) yields only its newest
    /// object. The handles have no `source_url`; [`LakeReader::read_all`]
    /// recovers it from the object metadata.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Key prefix, usually a `YYYY/MM/DD/` write date
    ///
    /// # Returns
    ///
    /// One handle per article id, in key order.
    #[instrument(level = "info", skip(self), fields(bucket = %self.bucket))]
    pub async fn list(&self, prefix: &str) -> Result<Vec<LakeObjectRef>, LakeError> {
        let keys = self.store.list_objects(self.bucket, prefix).await?;
        let all: Vec<LakeObjectRef> = keys
            .into_iter()
            .filter_map(|key| match parse_storage_key(&key) {
                Some(id) => Some(LakeObjectRef {
                    id,
                    storage_key: key,
                    source_url: String::new(),
                }),
                None => {
                    warn!(%key, "Skipping lake object with unrecognised key");
                    None
                }
            })
            .collect();

        // Keys sort chronologically per id, so the last occurrence is the newest.
        let total = all.len();
        let mut refs: Vec<LakeObjectRef> = all.into_iter().rev().unique_by(|r| r.id).collect();
        refs.reverse();
        if refs.len() < total {
            debug!(superseded = total - refs.len(), "Skipped older copies of re-written articles");
        }
        info!(count = refs.len(), "Listed lake objects");
        Ok(refs)
    }

    /// Read every referenced object back into a [`RawArticle`].
    ///
    /// The result has one entry per input, at the same index.
    #[instrument(level = "info", skip_all, fields(bucket = %self.bucket, total = refs.len()))]
    pub async fn read_all(
        &self,
        refs: &[LakeObjectRef],
        settings: &BatchSettings,
    ) -> Vec<Result<(RawArticle, LakeObjectRef), LakeError>> {
        let outcomes = run_batched("lake_read", refs, settings, |object_ref| async move {
            let result = self.read_one(object_ref).await;
            if let Err(e) = &result {
                error!(
                    id = object_ref.id,
                    key = %object_ref.storage_key,
                    error = %e,
                    "Failed to read raw article from lake"
                );
            }
            result
        })
        .await;

        let read = outcomes.iter().filter(|r| r.is_ok()).count();
        if read < refs.len() {
            warn!(read, failed = refs.len() - read, "Some lake objects could not be read");
        } else {
            info!(read, "Read raw articles from lake");
        }
        outcomes
    }

    async fn read_one(
        &self,
        object_ref: &LakeObjectRef,
    ) -> Result<(RawArticle, LakeObjectRef), LakeError> {
        let object = self
            .store
            .get_object(self.bucket, &object_ref.storage_key)
            .await?;

        let fetched_at = self.recover_fetched_at(object_ref, &object.metadata);
        let source_url = if object_ref.source_url.is_empty() {
            object
                .metadata
                .get(SOURCE_URL_KEY)
                .cloned()
                .unwrap_or_default()
        } else {
            object_ref.source_url.clone()
        };

        let resolved = LakeObjectRef {
            source_url: source_url.clone(),
            ..object_ref.clone()
        };
        let raw = RawArticle {
            id: object_ref.id,
            content: object.content,
            source_url,
            fetched_at,
        };
        Ok((raw, resolved))
    }

    fn recover_fetched_at(
        &self,
        object_ref: &LakeObjectRef,
        metadata: &BTreeMap<String, String>,
    ) -> DateTime<Utc> {
        match metadata.get(CRAWLED_AT_KEY) {
            Some(value) => decode_timestamp(value).unwrap_or_else(|| {
                let now = (self.clock)();
                warn!(
                    id = object_ref.id,
                    key = %object_ref.storage_key,
                    crawled_at = %value,
                    fallback = %encode_timestamp(now),
                    "Unparsable crawled_at metadata; using current time"
                );
                now
            }),
            None => {
                let now = (self.clock)();
                warn!(
                    id = object_ref.id,
                    key = %object_ref.storage_key,
                    fallback = %encode_timestamp(now),
                    "Missing crawled_at metadata; using current time"
                );
                now
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lake::memory::MemoryObjectStore;
    use chrono::TimeZone;
    use std::time::Duration;

    const BUCKET: &str = "raw-news";

    fn fixed_write_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 4, 9, 5, 3).unwrap()
    }

    fn fixed_fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn raw(id: i64) -> RawArticle {
        RawArticle {
            id,
            content: format!("<html><body>article {id} 한국어</body></html>").into_bytes(),
            source_url: format!("https://www.korea.kr/news/policyNewsView.do?newsId={id}"),
            fetched_at: Utc.timestamp_opt(1_752_480_123, 456_789_123).unwrap(),
        }
    }

    fn settings() -> BatchSettings {
        BatchSettings::new(5, Duration::ZERO)
    }

    #[test]
    fn test_storage_key_format() {
        assert_eq!(storage_key(42, fixed_write_time()), "2025/07/04/42_090503.html");
    }

    #[test]
    fn test_parse_storage_key() {
        assert_eq!(parse_storage_key("2025/07/04/42_090503.html"), Some(42));
        assert_eq!(parse_storage_key("2025/07/04/42.html"), None);
        assert_eq!(parse_storage_key("2025/07/04/x_090503.html"), None);
        assert_eq!(parse_storage_key("2025/07/04/42_0905.html"), None);
    }

    #[test]
    fn test_timestamp_encoding_keeps_microseconds() {
        let at = raw(1).fetched_at;
        let decoded = decode_timestamp(&encode_timestamp(at)).unwrap();
        assert_eq!(decoded.timestamp(), at.timestamp());
        assert_eq!(decoded.timestamp_subsec_micros(), at.timestamp_subsec_micros());
        assert_eq!(decode_timestamp("2025-07-14T18:30:00+09:00").unwrap().to_rfc3339(), "2025-07-14T09:30:00+00:00");
        assert!(decode_timestamp("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_lake() {
        let store = MemoryObjectStore::default();
        let writer = LakeWriter::new(&store, BUCKET).with_clock(fixed_write_time);
        let originals = vec![raw(1), raw(2)];

        let refs = writer.write_all(&originals, &settings()).await.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].storage_key, "2025/07/04/1_090503.html");

        let stored = store.object(BUCKET, &refs[0].storage_key).unwrap();
        assert_eq!(stored.content_type, HTML_CONTENT_TYPE);
        assert_eq!(stored.metadata[NEWS_ID_KEY], "1");

        let reader = LakeReader::new(&store, BUCKET).with_clock(fixed_fallback);
        let outcomes = reader.read_all(&refs, &settings()).await;
        for (outcome, original) in outcomes.into_iter().zip(&originals) {
            let (back, object_ref) = outcome.unwrap();
            assert_eq!(back.id, original.id);
            assert_eq!(back.content, original.content);
            assert_eq!(back.source_url, original.source_url);
            assert_eq!(back.fetched_at.timestamp(), original.fetched_at.timestamp());
            assert_eq!(
                back.fetched_at.timestamp_subsec_micros(),
                original.fetched_at.timestamp_subsec_micros()
            );
            assert_eq!(object_ref.id, original.id);
        }
    }

    #[tokio::test]
    async fn test_missing_crawled_at_uses_clock_fallback() {
        let store = MemoryObjectStore::default();
        store.ensure_bucket(BUCKET).await.unwrap();
        let key = "2025/07/04/7_090503.html";
        store
            .put_object(
                BUCKET,
                key,
                StoredObject {
                    content: b"<html></html>".to_vec(),
                    content_type: HTML_CONTENT_TYPE.to_string(),
                    metadata: BTreeMap::new(),
                },
            )
            .await
            .unwrap();

        let reader = LakeReader::new(&store, BUCKET).with_clock(fixed_fallback);
        let object_ref = LakeObjectRef {
            id: 7,
            storage_key: key.to_string(),
            source_url: "https://www.korea.kr/news/policyNewsView.do?newsId=7".to_string(),
        };
        let outcomes = reader.read_all(&[object_ref.clone(), object_ref], &settings()).await;

        for outcome in outcomes {
            let (raw, _) = outcome.unwrap();
            assert_eq!(raw.fetched_at, fixed_fallback());
        }
    }

    #[tokio::test]
    async fn test_unparsable_crawled_at_uses_clock_fallback() {
        let store = MemoryObjectStore::default();
        store.ensure_bucket(BUCKET).await.unwrap();
        let key = "2025/07/04/8_090503.html";
        let metadata = BTreeMap::from([(CRAWLED_AT_KEY.to_string(), "not a time".to_string())]);
        store
            .put_object(
                BUCKET,
                key,
                StoredObject {
                    content: Vec::new(),
                    content_type: HTML_CONTENT_TYPE.to_string(),
                    metadata,
                },
            )
            .await
            .unwrap();

        let reader = LakeReader::new(&store, BUCKET).with_clock(fixed_fallback);
        let object_ref = LakeObjectRef {
            id: 8,
            storage_key: key.to_string(),
            source_url: String::new(),
        };
        let (raw, _) = reader
            .read_all(&[object_ref], &settings())
            .await
            .remove(0)
            .unwrap();
        assert_eq!(raw.fetched_at, fixed_fallback());
    }

    #[tokio::test]
    async fn test_failed_write_is_excluded() {
        let store = MemoryObjectStore::default().fail_puts_containing("/2_");
        let writer = LakeWriter::new(&store, BUCKET).with_clock(fixed_write_time);

        let refs = writer
            .write_all(&[raw(1), raw(2), raw(3)], &settings())
            .await
            .unwrap();

        assert_eq!(refs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_missing_object_fails_only_that_item() {
        let store = MemoryObjectStore::default();
        let writer = LakeWriter::new(&store, BUCKET).with_clock(fixed_write_time);
        let mut refs = writer.write_all(&[raw(1)], &settings()).await.unwrap();
        refs.push(LakeObjectRef {
            id: 9,
            storage_key: "2025/07/04/9_000000.html".to_string(),
            source_url: String::new(),
        });

        let reader = LakeReader::new(&store, BUCKET);
        let outcomes = reader.read_all(&refs, &settings()).await;
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(LakeError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_recovers_source_url_from_metadata() {
        let store = MemoryObjectStore::default();
        let writer = LakeWriter::new(&store, BUCKET).with_clock(fixed_write_time);
        writer.write_all(&[raw(5), raw(6)], &settings()).await.unwrap();

        let reader = LakeReader::new(&store, BUCKET);
        let listed = reader.list("2025/07/04/").await.unwrap();
        assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5, 6]);
        assert!(listed.iter().all(|r| r.source_url.is_empty()));

        let (raw_back, resolved) = reader.read_all(&listed, &settings()).await.remove(0).unwrap();
        assert_eq!(raw_back.source_url, raw(5).source_url);
        assert_eq!(resolved.source_url, raw(5).source_url);
        assert!(reader.list("2025/07/05/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_keeps_newest_copy_of_each_article() {
        fn later_write_time() -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2025, 7, 4, 17, 45, 0).unwrap()
        }

        let store = MemoryObjectStore::default();
        LakeWriter::new(&store, BUCKET)
            .with_clock(fixed_write_time)
            .write_all(&[raw(7), raw(12)], &settings())
            .await
            .unwrap();
        LakeWriter::new(&store, BUCKET)
            .with_clock(later_write_time)
            .write_all(&[raw(7)], &settings())
            .await
            .unwrap();
        assert_eq!(store.len(BUCKET), 3);

        let listed = LakeReader::new(&store, BUCKET).list("2025/07/04/").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|r| r.storage_key.as_str()).collect();
        assert_eq!(keys, vec!["2025/07/04/12_090503.html", "2025/07/04/7_174500.html"]);
    }
}
