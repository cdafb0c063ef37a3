//! Listing discovery for the korea.kr policy news search.
//!
//! The search form is paginated: each page is requested with a form POST of
//! `{pageIndex, startDate, endDate, period = "direct"}` and the article links
//! are scraped from the result list. The site has no total count; the first
//! page without links marks the end of the listing.
//!
//! Any HTTP failure aborts discovery. A partial listing is never returned
//! because persisting it would silently under-crawl the date range.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::DiscoveryError;
use crate::http::PageClient;
use crate::models::ArticleRef;

/// Article links inside the search result list.
static LISTING_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.article_wrap div.list_type li > a").expect("static selector is valid")
});

/// Date range and pacing for one listing crawl.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
    /// Fail instead of requesting more than this many pages.
    pub max_pages: Option<u32>,
}

/// Walk the listing pages for `query` and collect every article URL.
///
/// Requests pages 1, 2, … until a page yields no links, so a listing with N
/// non-empty pages costs exactly N + 1 requests.
///
/// # Arguments
///
/// * `client` - Transport used for the form POSTs
/// * `list_url` - Absolute URL of the search form
/// * `query` - Date range, page pacing and optional page cap
///
/// # Returns
///
/// Article links in listing order, or a [`DiscoveryError`] if any page
/// request fails, the cap is hit, or the range is inverted.
#[instrument(level = "info", skip(client, query), fields(start = %query.start_date, end = %query.end_date))]
pub async fn discover<C: PageClient>(
    client: &C,
    list_url: &str,
    query: &ListingQuery,
) -> Result<Vec<ArticleRef>, DiscoveryError> {
    if query.start_date > query.end_date {
        return Err(DiscoveryError::InvalidRange {
            start: query.start_date.to_string(),
            end: query.end_date.to_string(),
        });
    }

    let base = Url::parse(list_url).ok();
    let mut refs = Vec::new();
    let mut page: u32 = 1;

    loop {
        if let Some(max_pages) = query.max_pages {
            if page > max_pages {
                return Err(DiscoveryError::PageLimit { max_pages });
            }
        }

        let form = [
            ("pageIndex", page.to_string()),
            ("startDate", query.start_date.format("%Y-%m-%d").to_string()),
            ("endDate", query.end_date.format("%Y-%m-%d").to_string()),
            ("period", "direct".to_string()),
        ];
        let body = client
            .post_form(list_url, &form)
            .await
            .map_err(|source| DiscoveryError::Http { page, source })?;

        let links = extract_links(&body, base.as_ref());
        if links.is_empty() {
            info!(page, total = refs.len(), "Listing finished: empty page");
            break;
        }

        info!(page, count = links.len(), "Found article links on listing page");
        debug!(urls = ?links, "Listing page URLs");
        refs.extend(links.into_iter().map(|url| ArticleRef { url }));

        page += 1;
        if !query.page_delay.is_zero() {
            sleep(query.page_delay).await;
        }
    }

    Ok(refs)
}

/// Scrape article links from one listing page, resolved against `base`.
///
/// Links that cannot be resolved are skipped.
pub fn extract_links(html: &str, base: Option<&Url>) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LISTING_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| match base {
            Some(base) => base.join(href.trim()).ok().map(|u| u.to_string()),
            None => Url::parse(href.trim()).ok().map(|u| u.to_string()),
        })
        .collect()
}
