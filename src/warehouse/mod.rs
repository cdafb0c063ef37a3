//! The data warehouse: parsed articles as rows keyed by article id.
//!
//! Loading is an upsert. A row that already exists for an id has every column
//! replaced by the incoming record, so re-running a crawl over the same date
//! range leaves the table in the same state instead of duplicating rows.

pub mod postgres;
#[cfg(test)]
pub mod memory;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::batch::{BatchSettings, run_batched};
use crate::error::WarehouseError;
use crate::models::Record;

/// Relational store holding [`Record`]s.
pub trait Warehouse {
    /// Create the target table if it does not exist.
    async fn ensure_schema(&self) -> Result<(), WarehouseError>;

    /// Insert `record`, or overwrite every column of the row with the same id.
    async fn upsert(&self, record: &Record) -> Result<(), WarehouseError>;
}

/// Outcome counts of one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub loaded: usize,
    pub failed: usize,
}

/// Upsert every record in paced, concurrent batches.
///
/// Schema creation failing aborts the load. A failed upsert is logged with the
/// record id and counted; its siblings are unaffected.
///
/// # Returns
///
/// Loaded and failed counts, or the schema error that stopped the load.
#[instrument(level = "info", skip_all, fields(total = records.len()))]
pub async fn upsert_all<W: Warehouse>(
    warehouse: &W,
    records: &[Record],
    settings: &BatchSettings,
) -> Result<LoadSummary, WarehouseError> {
    warehouse.ensure_schema().await?;

    let outcomes = run_batched("warehouse_load", records, settings, |record| async move {
        let result = warehouse.upsert(record).await;
        match &result {
            Ok(()) => info!(id = record.id, "Upserted record"),
            Err(e) => error!(id = record.id, error = %e, "Failed to upsert record"),
        }
        result
    })
    .await;

    let loaded = outcomes.iter().filter(|r| r.is_ok()).count();
    let summary = LoadSummary {
        loaded,
        failed: outcomes.len() - loaded,
    };
    if summary.failed > 0 {
        warn!(loaded = summary.loaded, failed = summary.failed, "Some records were not loaded");
    } else {
        info!(loaded = summary.loaded, "Loaded all records");
    }
    Ok(summary)
}
