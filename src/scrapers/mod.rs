//! Network side of the pipeline for the korea.kr policy briefing portal.
//!
//! Scraping follows the usual two phases:
//!
//! 1. **Listing**: [`listing::discover`] walks the paginated search form and
//!    returns every article URL for a date range
//! 2. **Fetching**: [`articles::fetch_all`] downloads the raw pages in paced
//!    batches, one outcome per URL
//!
//! Both go through [`crate::http::PageClient`], so neither depends on a live
//! network in tests.

pub mod articles;
pub mod listing;
