//! JSON run reports.
//!
//! Each invocation that completes writes one file named after its start time
//! and command, so reports sort chronologically and never overwrite each other.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

use crate::pipeline::PipelineReport;

/// Summary of one completed command.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub command: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub complete: bool,
    pub counts: PipelineReport,
}

impl RunReport {
    pub fn new(
        command: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        started_at: DateTime<Utc>,
        counts: PipelineReport,
    ) -> Self {
        Self {
            command: command.to_string(),
            start_date,
            end_date,
            started_at,
            finished_at: Utc::now(),
            complete: counts.is_complete(),
            counts,
        }
    }

    /// `{started_at}_{command}.json`, with the timestamp in basic ISO 8601 form.
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.started_at.format("%Y%m%dT%H%M%SZ"), self.command)
    }
}

/// Write `report` as pretty-printed JSON into `report_dir`.
///
/// # Arguments
///
/// * `report` - The finished run to serialize
/// * `report_dir` - Target directory, created if missing
///
/// # Returns
///
/// The path of the written file.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir))]
pub async fn write_report(report: &RunReport, report_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    if let Err(e) = fs::create_dir_all(report_dir).await {
        error!(report_dir, error = %e, "Failed to create report dir");
        return Err(e.into());
    }

    let path = PathBuf::from(report_dir).join(report.file_name());
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run report");

    Ok(path)
}
