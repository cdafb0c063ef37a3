//! Batched execution with pacing and per-item outcomes.
//!
//! Every I/O stage of the pipeline (fetch, lake write, lake read, warehouse
//! load) runs through [`run_batched`]: items are split into fixed-size batches
//! in input order, every item of a batch runs concurrently, and a pacing delay
//! separates consecutive batches. Each item yields its own `Result`, so one
//! failure never cancels its siblings.

use futures::future::join_all;
use itertools::Itertools;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Default number of items processed concurrently per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Concurrency and pacing knobs for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Items per batch. Zero is treated as one.
    pub batch_size: usize,
    /// Pause between the end of one batch and the start of the next.
    pub batch_delay: Duration,
}

impl BatchSettings {
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            batch_size,
            batch_delay,
        }
    }

    fn effective_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Run `op` over `items` in paced, concurrent batches.
///
/// The returned vector has one outcome per input item, at the same index.
/// The delay is applied after every batch except the last.
///
/// # Arguments
///
/// * `stage` - Name used in the per-batch log lines
/// * `items` - Inputs, processed in order
/// * `settings` - Batch size and inter-batch delay
/// * `op` - Operation applied to each item
pub async fn run_batched<'a, T, O, E, F, Fut>(
    stage: &str,
    items: &'a [T],
    settings: &BatchSettings,
    op: F,
) -> Vec<Result<O, E>>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    let size = settings.effective_size();
    let total_batches = items.len().div_ceil(size);
    let mut outcomes = Vec::with_capacity(items.len());

    for (index, batch) in items.chunks(size).enumerate() {
        info!(
            stage,
            batch = index + 1,
            total_batches,
            items = batch.len(),
            "Processing batch"
        );

        let results = join_all(batch.iter().map(&op)).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(stage, batch = index + 1, failed, "Batch finished");
        outcomes.extend(results);

        if index + 1 < total_batches && !settings.batch_delay.is_zero() {
            info!(stage, delay = ?settings.batch_delay, "Waiting before next batch");
            sleep(settings.batch_delay).await;
        }
    }

    outcomes
}

/// Split batch outcomes into successes and failures, keeping relative order.
pub fn split_outcomes<O, E>(outcomes: Vec<Result<O, E>>) -> (Vec<O>, Vec<E>) {
    outcomes.into_iter().partition_result()
}
