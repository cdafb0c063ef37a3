//! Batched article fetching.
//!
//! Discovered URLs are fetched in fixed-size batches with a pacing delay in
//! between. Every URL yields its own outcome: a bad status, a transport error
//! or a URL without a usable `newsId` fails that URL only. Failed fetches are
//! not retried; re-running the pipeline for the same date range recovers them.

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::batch::{BatchSettings, run_batched};
use crate::error::FetchError;
use crate::http::PageClient;
use crate::models::{ArticleRef, RawArticle, news_id_from_url};

/// Fetch every article in `refs`.
///
/// The result has one entry per input, at the same index.
///
/// # Arguments
///
/// * `client` - Transport used for the GETs
/// * `refs` - Article links from discovery
/// * `settings` - Batch size and the pause between batches
///
/// # Returns
///
/// A [`RawArticle`] per successful fetch, or the [`FetchError`] for that URL.
/// A URL without a usable `newsId` fails before any request is sent.
#[instrument(level = "info", skip_all, fields(total = refs.len()))]
pub async fn fetch_all<C: PageClient>(
    client: &C,
    refs: &[ArticleRef],
    settings: &BatchSettings,
) -> Vec<Result<RawArticle, FetchError>> {
    let outcomes = run_batched("fetch", refs, settings, |article| async move {
        let result = fetch_article(client, article).await;
        if let Err(e) = &result {
            error!(url = %article.url, error = %e, "Article fetch failed");
        }
        result
    })
    .await;

    let fetched = outcomes.iter().filter(|r| r.is_ok()).count();
    if fetched < refs.len() {
        warn!(
            requested = refs.len(),
            fetched,
            failed = refs.len() - fetched,
            "Some article fetches failed"
        );
    } else {
        info!(fetched, "Fetched all article pages");
    }
    outcomes
}

/// Fetch one article page and stamp it with the fetch time.
async fn fetch_article<C: PageClient>(
    client: &C,
    article: &ArticleRef,
) -> Result<RawArticle, FetchError> {
    let id = news_id_from_url(&article.url).map_err(|source| FetchError::NewsId {
        url: article.url.clone(),
        source,
    })?;

    let content = client.get(&article.url).await?;
    let fetched_at = Utc::now();
    info!(id, url = %article.url, bytes = content.len(), "Fetched article page");

    Ok(RawArticle {
        id,
        content,
        source_url: article.url.clone(),
        fetched_at,
    })
}
