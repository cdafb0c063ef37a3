//! Stage orchestration.
//!
//! A run executes the stages strictly one after another, each draining fully
//! before the next starts:
//!
//! ```text
//! discover → fetch → lake write ┃ lake read → transform → warehouse load
//! ```
//!
//! The lake is the boundary between the two halves. [`Pipeline::reload`]
//! starts from the right half, re-parsing objects already in the lake.
//!
//! Only stage-level failures (listing discovery, an unreachable lake or
//! warehouse) end a run with an error. Item failures shrink the counts in the
//! [`PipelineReport`] and are visible in the per-stage log lines.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::batch::split_outcomes;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::http::PageClient;
use crate::lake::{Clock, LakeReader, LakeWriter, ObjectStore};
use crate::models::{LakeObjectRef, RawArticle};
use crate::scrapers::articles::fetch_all;
use crate::scrapers::listing::{ListingQuery, discover};
use crate::transform::{ArticleParser, transform_all};
use crate::utils::date_prefix;
use crate::warehouse::{Warehouse, upsert_all};

/// Item counts after each stage of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub discovered: usize,
    pub fetched: usize,
    pub stored: usize,
    pub read: usize,
    pub transformed: usize,
    pub loaded: usize,
    pub load_failed: usize,
}

impl PipelineReport {
    /// True when every item that entered the pipeline reached the warehouse.
    ///
    /// A reload never runs discovery or fetching, so those counts stay zero and
    /// the comparison starts at `stored`.
    pub fn is_complete(&self) -> bool {
        let crawled = self.discovered > 0 || self.fetched > 0;
        let crawl_complete = !crawled || (self.discovered == self.fetched && self.fetched == self.stored);
        crawl_complete
            && self.load_failed == 0
            && self.stored == self.read
            && self.read == self.transformed
            && self.transformed == self.loaded
    }
}

fn log_stage(stage: &str, input: usize, output: usize) {
    if output < input {
        warn!(stage, input, output, dropped = input - output, "Stage completed with failures");
    } else {
        info!(stage, input, output, "Stage completed");
    }
}

/// One configured pipeline over concrete network, lake and warehouse backends.
pub struct Pipeline<'a, C, S, W, P> {
    client: &'a C,
    store: &'a S,
    warehouse: &'a W,
    parser: P,
    config: &'a PipelineConfig,
    clock: Option<Clock>,
}

impl<'a, C, S, W, P> Pipeline<'a, C, S, W, P>
where
    C: PageClient,
    S: ObjectStore,
    W: Warehouse,
    P: ArticleParser,
{
    pub fn new(
        client: &'a C,
        store: &'a S,
        warehouse: &'a W,
        parser: P,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            client,
            store,
            warehouse,
            parser,
            config,
            clock: None,
        }
    }

    /// Pin the lake's notion of "now" (object keys and `fetched_at` fallback).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    fn writer(&self) -> LakeWriter<'a, S> {
        let writer = LakeWriter::new(self.store, &self.config.bucket);
        match self.clock {
            Some(clock) => writer.with_clock(clock),
            None => writer,
        }
    }

    fn reader(&self) -> LakeReader<'a, S> {
        let reader = LakeReader::new(self.store, &self.config.bucket);
        match self.clock {
            Some(clock) => reader.with_clock(clock),
            None => reader,
        }
    }

    /// Crawl articles published between `start_date` and `end_date` inclusive.
    #[instrument(level = "info", skip(self))]
    pub async fn run(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();

        let query = ListingQuery {
            start_date,
            end_date,
            page_delay: self.config.page_delay,
            max_pages: self.config.max_pages,
        };
        let refs = discover(self.client, &self.config.list_url, &query).await?;
        report.discovered = refs.len();
        info!(discovered = report.discovered, "Discovery completed");
        if refs.is_empty() {
            warn!("No articles found for the date range");
            return Ok(report);
        }

        let (raws, _failed): (Vec<RawArticle>, _) =
            split_outcomes(fetch_all(self.client, &refs, &self.config.fetch).await);
        report.fetched = raws.len();
        log_stage("fetch", report.discovered, report.fetched);

        let objects = self.writer().write_all(&raws, &self.config.lake_write).await?;
        report.stored = objects.len();
        log_stage("lake_write", report.fetched, report.stored);
        drop(raws);

        self.load_from_lake(&objects, report).await
    }

    /// Re-parse and load every object the lake holds for write date `date`.
    #[instrument(level = "info", skip(self))]
    pub async fn reload(&self, date: NaiveDate) -> Result<PipelineReport, PipelineError> {
        let objects = self.reader().list(&date_prefix(date)).await?;
        let report = PipelineReport {
            stored: objects.len(),
            ..PipelineReport::default()
        };
        if objects.is_empty() {
            warn!(%date, "No lake objects found for date");
            return Ok(report);
        }
        self.load_from_lake(&objects, report).await
    }

    async fn load_from_lake(
        &self,
        objects: &[LakeObjectRef],
        mut report: PipelineReport,
    ) -> Result<PipelineReport, PipelineError> {
        let (pairs, _failed): (Vec<_>, _) =
            split_outcomes(self.reader().read_all(objects, &self.config.lake_read).await);
        let raws: Vec<RawArticle> = pairs.into_iter().map(|(raw, _)| raw).collect();
        report.read = raws.len();
        log_stage("lake_read", objects.len(), report.read);

        let records = transform_all(&self.parser, &raws);
        report.transformed = records.len();
        log_stage("transform", report.read, report.transformed);
        drop(raws);

        let summary = upsert_all(self.warehouse, &records, &self.config.load).await?;
        report.loaded = summary.loaded;
        report.load_failed = summary.failed;
        log_stage("warehouse_load", report.transformed, report.loaded);

        info!(
            discovered = report.discovered,
            fetched = report.fetched,
            stored = report.stored,
            read = report.read,
            transformed = report.transformed,
            loaded = report.loaded,
            complete = report.is_complete(),
            "Pipeline finished"
        );
        Ok(report)
    }
}
