//! Extraction rules for korea.kr policy briefing article pages.
//!
//! # Fields
//!
//! | Field | Source | Required |
//! |-------|--------|----------|
//! | id | `newsId` query parameter of the URL | yes |
//! | title | `div.view_title > h1` | yes |
//! | subtitles | lines of `div.article_head > h2` | no |
//! | publisher | second `div.info span`, minus its `<i>` label | no |
//! | body | `div.view_cont` | yes |
//! | images | `span.imageSpan > img` (`src`, `alt`) | no |
//! | tags | JSON-LD `keyword` | no |
//! | published_at | JSON-LD `datePublished` | yes |
//!
//! A JSON-LD block that is present but not valid JSON fails the record.
//! Timestamps without an offset are read as Korea Standard Time.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::ArticleParser;
use crate::error::ExtractionError;
use crate::models::{ArticleImage, Record, news_id_from_url};
use crate::utils::truncate_for_log;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static TITLE: Lazy<Selector> = Lazy::new(|| selector("div.view_title > h1"));
static SUBTITLES: Lazy<Selector> = Lazy::new(|| selector("div.article_head > h2"));
static INFO_SPANS: Lazy<Selector> = Lazy::new(|| selector("div.info span"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("div.view_cont"));
static IMAGES: Lazy<Selector> = Lazy::new(|| selector("span.imageSpan > img"));
static JSON_LD: Lazy<Selector> = Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex is valid"));

/// Offset applied to timestamps published without one (KST, UTC+9).
const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Parser for the korea.kr article template.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyBriefingParser;

impl ArticleParser for PolicyBriefingParser {
    #[instrument(level = "debug", skip(self, content), fields(bytes = content.len()))]
    fn transform(
        &self,
        content: &[u8],
        source_url: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<Record, ExtractionError> {
        let id = news_id_from_url(source_url)?;
        let html = String::from_utf8_lossy(content);
        let document = Html::parse_document(&html);

        let title = document
            .select(&TITLE)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .ok_or(ExtractionError::MissingElement("title"))?;

        let body = document
            .select(&BODY)
            .next()
            .map(|el| el.text().collect::<String>().replace('\u{a0}', "").trim().to_string())
            .filter(|b| !b.is_empty())
            .ok_or(ExtractionError::MissingElement("body"))?;

        let subtitles = document
            .select(&SUBTITLES)
            .next()
            .map(subtitle_lines)
            .unwrap_or_default();

        let publisher = document
            .select(&INFO_SPANS)
            .nth(1)
            .map(text_without_labels)
            .unwrap_or_default();

        let base = Url::parse(source_url).ok();
        let images: Vec<ArticleImage> = document
            .select(&IMAGES)
            .filter_map(|img| {
                let src = img.value().attr("src")?.trim();
                if src.is_empty() {
                    return None;
                }
                let url = base
                    .as_ref()
                    .and_then(|b| b.join(src).ok())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| src.to_string());
                let caption = img.value().attr("alt").unwrap_or_default().trim().to_string();
                Some(ArticleImage { url, caption })
            })
            .collect();

        let structured = match document.select(&JSON_LD).next() {
            Some(script) => {
                let text = script.text().collect::<String>();
                let value = serde_json::from_str::<Value>(text.trim())
                    .map_err(ExtractionError::InvalidStructuredData)?;
                Some(value)
            }
            None => None,
        };

        let tags = structured
            .as_ref()
            .and_then(|v| structured_field(v, "keyword"))
            .map(split_keywords)
            .unwrap_or_default();

        let published_raw = structured
            .as_ref()
            .and_then(|v| structured_field(v, "datePublished"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ExtractionError::MissingPublishedAt)?;
        let published_at = parse_published_at(published_raw)
            .ok_or_else(|| ExtractionError::InvalidPublishedAt(published_raw.to_string()))?;

        debug!(
            id,
            title = %truncate_for_log(&title, 80),
            subtitles = subtitles.len(),
            images = images.len(),
            tags = tags.len(),
            %published_at,
            "Extracted article"
        );

        Ok(Record {
            id,
            title,
            subtitles,
            publisher,
            body,
            images,
            tags,
            source_url: source_url.to_string(),
            published_at,
            fetched_at,
        })
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// One subtitle per child of the heading; `<br>` separators yield nothing.
fn subtitle_lines(heading: ElementRef<'_>) -> Vec<String> {
    heading
        .children()
        .filter_map(|node| {
            if let Some(text) = node.value().as_text() {
                Some(text.to_string())
            } else {
                ElementRef::wrap(node).map(|el| el.text().collect::<String>())
            }
        })
        .map(|line| collapse_whitespace(&line))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Text of `span` with `<i>` children (icon labels such as "담당부서") removed.
fn text_without_labels(span: ElementRef<'_>) -> String {
    let text: String = span
        .children()
        .filter_map(|node| {
            if let Some(text) = node.value().as_text() {
                return Some(text.to_string());
            }
            let el = ElementRef::wrap(node)?;
            if el.value().name() == "i" {
                None
            } else {
                Some(el.text().collect())
            }
        })
        .collect();
    collapse_whitespace(&text)
}

/// Look up `key` in a JSON-LD value: a single object, an array of objects,
/// or an object with an `@graph` array.
fn structured_field<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key).or_else(|| {
            map.get("@graph")
                .and_then(|graph| structured_field(graph, key))
        }),
        Value::Array(items) => items.iter().find_map(|item| structured_field(item, key)),
        _ => None,
    }
}

fn split_keywords(value: &Value) -> Vec<String> {
    let parts: Vec<&str> = match value {
        Value::String(s) => s.split(',').collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an ISO 8601 publication timestamp. Values without an offset are KST.
pub fn parse_published_at(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(at) = DateTime::parse_from_str(value, format) {
            return Some(at);
        }
    }

    let kst = FixedOffset::east_opt(KST_OFFSET_SECS)?;
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    naive.and_local_timezone(kst).single()
}
