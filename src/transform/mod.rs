//! Turning raw article pages into [`Record`]s.
//!
//! Extraction rules are site specific and sit behind the [`ArticleParser`]
//! trait; [`policy_briefing::PolicyBriefingParser`] implements them for the
//! korea.kr article template. [`transform_all`] applies a parser to a batch
//! and drops (with a log line) any document that fails extraction, so one bad
//! page never takes its siblings down with it.

pub mod policy_briefing;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::error::ExtractionError;
use crate::models::{RawArticle, Record};

/// Extraction contract for one site template.
pub trait ArticleParser {
    /// Parse `content` fetched from `source_url` at `fetched_at`.
    ///
    /// `fetched_at` is copied into the record unchanged.
    fn transform(
        &self,
        content: &[u8],
        source_url: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<Record, ExtractionError>;
}

/// Parse one raw article and check that the record kept its identity.
pub fn transform_one<P: ArticleParser>(parser: &P, raw: &RawArticle) -> Result<Record, ExtractionError> {
    let record = parser.transform(&raw.content, &raw.source_url, raw.fetched_at)?;
    if record.id != raw.id {
        return Err(ExtractionError::IdMismatch {
            expected: raw.id,
            found: record.id,
        });
    }
    Ok(record)
}

/// Parse every raw article, keeping only the ones that succeed.
#[instrument(level = "info", skip_all, fields(total = raws.len()))]
pub fn transform_all<P: ArticleParser>(parser: &P, raws: &[RawArticle]) -> Vec<Record> {
    let records: Vec<Record> = raws
        .iter()
        .filter_map(|raw| match transform_one(parser, raw) {
            Ok(record) => Some(record),
            Err(e) => {
                error!(id = raw.id, url = %raw.source_url, error = %e, "Failed to transform article");
                None
            }
        })
        .collect();

    if records.len() < raws.len() {
        warn!(
            transformed = records.len(),
            failed = raws.len() - records.len(),
            "Some articles could not be transformed"
        );
    } else {
        info!(transformed = records.len(), "Transformed all articles");
    }
    records
}
