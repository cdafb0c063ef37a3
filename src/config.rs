//! Typed pipeline configuration.
//!
//! The CLI is converted once into a [`PipelineConfig`], which is then passed
//! explicitly to every stage. Nothing downstream reads flags or environment
//! variables itself.

use std::path::PathBuf;
use std::time::Duration;

use crate::batch::BatchSettings;
use crate::cli::Options;
use crate::http::HttpSettings;
use crate::warehouse::postgres::PgSettings;

/// How long to wait for a free PostgreSQL connection before failing.
const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Absolute URL of the paginated search form.
    pub list_url: String,
    pub http: HttpSettings,
    pub lake_dir: PathBuf,
    pub bucket: String,
    /// `None` when no database URL was given; commands that load fail early.
    pub warehouse: Option<PgSettings>,
    pub page_delay: Duration,
    pub max_pages: Option<u32>,
    pub fetch: BatchSettings,
    pub lake_write: BatchSettings,
    pub lake_read: BatchSettings,
    pub load: BatchSettings,
    pub report_dir: Option<String>,
}

impl PipelineConfig {
    pub fn from_options(options: &Options) -> Self {
        let base_url = options.base_url.trim_end_matches('/').to_string();
        let list_url = if options.list_path.starts_with("http://") || options.list_path.starts_with("https://") {
            options.list_path.clone()
        } else {
            format!("{}/{}", base_url, options.list_path.trim_start_matches('/'))
        };

        let stage_delay = Duration::from_millis(options.stage_delay_ms);
        Self {
            list_url,
            http: HttpSettings {
                timeout: Duration::from_secs(options.request_timeout_secs.max(1)),
                referer: base_url,
            },
            lake_dir: PathBuf::from(&options.lake_dir),
            bucket: options.bucket.clone(),
            warehouse: options.database_url.as_ref().map(|url| PgSettings {
                database_url: url.clone(),
                table: options.table.clone(),
                max_connections: options.db_max_connections,
                acquire_timeout: DB_ACQUIRE_TIMEOUT,
            }),
            page_delay: Duration::from_millis(options.page_delay_ms),
            max_pages: options.max_pages,
            fetch: BatchSettings::new(options.batch_size, Duration::from_millis(options.fetch_delay_ms)),
            // Writes are local and unpaced; only their concurrency is bounded.
            lake_write: BatchSettings::new(options.batch_size, Duration::ZERO),
            lake_read: BatchSettings::new(options.batch_size, stage_delay),
            load: BatchSettings::new(options.batch_size, stage_delay),
            report_dir: options.report_dir.clone(),
        }
    }
}
