//! In-memory [`ObjectStore`] for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{ObjectStore, StoredObject};
use crate::error::LakeError;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, StoredObject>>>,
    failing_puts: Vec<String>,
}

impl MemoryObjectStore {
    /// Make every put whose key contains `fragment` fail.
    pub fn fail_puts_containing(mut self, fragment: &str) -> Self {
        self.failing_puts.push(fragment.to_string());
        self
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn len(&self, bucket: &str) -> usize {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map_or(0, BTreeMap::len)
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), LakeError> {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, object: StoredObject) -> Result<(), LakeError> {
        if self.failing_puts.iter().any(|f| key.contains(f.as_str())) {
            return Err(LakeError::Io {
                path: format!("{bucket}/{key}"),
                source: std::io::Error::other("injected put failure"),
            });
        }
        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| LakeError::InvalidBucket(bucket.to_string()))?;
        objects.insert(key.to_string(), object);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, LakeError> {
        self.object(bucket, key).ok_or_else(|| LakeError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, LakeError> {
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|objects| {
                objects
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
