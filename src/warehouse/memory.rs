//! In-memory [`Warehouse`] for tests. Upserts replace the whole row, like
//! `ON CONFLICT (id) DO UPDATE` does in PostgreSQL.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::Warehouse;
use crate::error::WarehouseError;
use crate::models::Record;

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    rows: Mutex<BTreeMap<i64, Record>>,
    failing_ids: HashSet<i64>,
    schema_fails: bool,
}

impl MemoryWarehouse {
    pub fn fail_on(mut self, id: i64) -> Self {
        self.failing_ids.insert(id);
        self
    }

    pub fn fail_schema(mut self) -> Self {
        self.schema_fails = true;
        self
    }

    /// All rows ordered by id.
    pub fn rows(&self) -> Vec<Record> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

impl Warehouse for MemoryWarehouse {
    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        if self.schema_fails {
            return Err(WarehouseError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn upsert(&self, record: &Record) -> Result<(), WarehouseError> {
        if self.failing_ids.contains(&record.id) {
            return Err(WarehouseError::Database(sqlx::Error::Protocol(format!(
                "injected failure for record {}",
                record.id
            ))));
        }
        self.rows.lock().unwrap().insert(record.id, record.clone());
        Ok(())
    }
}
