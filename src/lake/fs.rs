//! Filesystem-backed [`ObjectStore`].
//!
//! A bucket is a directory under the lake root and an object key is a
//! relative path inside it. Content type and user metadata live in a JSON
//! sidecar next to the object:
//!
//! ```text
//! lake_dir/
//! └── raw-news/
//!     └── 2025/07/14/
//!         ├── 148942535_093012.html
//!         └── 148942535_093012.html.meta.json
//! ```
//!
//! Both files are written to a temporary `*.partial` name first and renamed
//! into place, so readers never observe a half-written object.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

use super::{ObjectStore, StoredObject};
use crate::error::LakeError;

const SIDECAR_SUFFIX: &str = ".meta.json";
const TEMP_SUFFIX: &str = ".partial";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    metadata: BTreeMap<String, String>,
}

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LakeError + '_ {
    move |source| LakeError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Accept only plain relative paths: no `..`, no absolute roots, no empty segments.
fn is_safe_relative(value: &str) -> bool {
    !value.is_empty()
        && !value.contains('\\')
        && value.split('/').all(|segment| !segment.is_empty())
        && Path::new(value)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, LakeError> {
        if !is_safe_relative(bucket) || bucket.contains('/') {
            return Err(LakeError::InvalidBucket(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, LakeError> {
        if !is_safe_relative(key) || key.ends_with(SIDECAR_SUFFIX) || key.ends_with(TEMP_SUFFIX) {
            return Err(LakeError::InvalidKey(key.to_string()));
        }
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    /// Write through a temp file unique to this call, then rename over `path`.
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LakeError> {
        let mut temp = path.as_os_str().to_owned();
        temp.push(format!(".{:016x}{}", rand::random::<u64>(), TEMP_SUFFIX));
        let temp = PathBuf::from(temp);
        fs::write(&temp, bytes).await.map_err(io_error(&temp))?;
        fs::rename(&temp, path).await.map_err(io_error(path))
    }
}

fn sidecar_path(object_path: &Path) -> PathBuf {
    let mut path = object_path.as_os_str().to_owned();
    path.push(SIDECAR_SUFFIX);
    PathBuf::from(path)
}

impl ObjectStore for FsObjectStore {
    #[instrument(level = "debug", skip(self))]
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), LakeError> {
        let dir = self.bucket_dir(bucket)?;
        // create_dir_all succeeds when the directory already exists, including
        // when another task created it a moment earlier.
        fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;
        debug!(path = %dir.display(), "Bucket ready");
        Ok(())
    }

    #[instrument(level = "debug", skip(self, object), fields(bytes = object.content.len()))]
    async fn put_object(&self, bucket: &str, key: &str, object: StoredObject) -> Result<(), LakeError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }

        let sidecar = Sidecar {
            content_type: object.content_type,
            metadata: object.metadata,
        };
        let sidecar_bytes = serde_json::to_vec_pretty(&sidecar).map_err(|source| LakeError::Metadata {
            key: key.to_string(),
            source,
        })?;

        Self::write_atomic(&sidecar_path(&path), &sidecar_bytes).await?;
        Self::write_atomic(&path, &object.content).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, LakeError> {
        let path = self.object_path(bucket, key)?;
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LakeError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        // Objects without a sidecar are still readable; they just carry no metadata.
        let sidecar_file = sidecar_path(&path);
        let sidecar = match fs::read(&sidecar_file).await {
            Ok(bytes) => serde_json::from_slice::<Sidecar>(&bytes).map_err(|source| LakeError::Metadata {
                key: key.to_string(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => Sidecar {
                content_type: "application/octet-stream".to_string(),
                metadata: BTreeMap::new(),
            },
            Err(e) => return Err(io_error(&sidecar_file)(e)),
        };

        Ok(StoredObject {
            content,
            content_type: sidecar.content_type,
            metadata: sidecar.metadata,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, LakeError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let mut keys = Vec::new();
        let mut pending = vec![bucket_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&dir)(e)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(io_error(&path))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.ends_with(SIDECAR_SUFFIX) || key.ends_with(TEMP_SUFFIX) {
                    continue;
                }
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lake::{CRAWLED_AT_KEY, HTML_CONTENT_TYPE};

    fn object(body: &str) -> StoredObject {
        StoredObject {
            content: body.as_bytes().to_vec(),
            content_type: HTML_CONTENT_TYPE.to_string(),
            metadata: BTreeMap::from([(
                CRAWLED_AT_KEY.to_string(),
                "2025-07-14T09:30:12.123456Z".to_string(),
            )]),
        }
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_bucket("raw-news").await.unwrap();

        let key = "2025/07/14/1_093012.html";
        store.put_object("raw-news", key, object("<html>1</html>")).await.unwrap();

        let back = store.get_object("raw-news", key).await.unwrap();
        assert_eq!(back, object("<html>1</html>"));
        assert!(dir.path().join("raw-news/2025/07/14/1_093012.html").exists());
        assert!(dir.path().join("raw-news/2025/07/14/1_093012.html.meta.json").exists());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_bucket("b").await.unwrap();

        store.put_object("b", "k.html", object("old")).await.unwrap();
        store.put_object("b", "k.html", object("new")).await.unwrap();
        assert_eq!(store.get_object("b", "k.html").await.unwrap().content, b"new".to_vec());
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_bucket("b").await.unwrap();

        let key = "2025/07/14/1_093012.html";
        let results =
            futures::future::join_all((0..8).map(|i| store.put_object("b", key, object(&format!("v{i}"))))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        let content = store.get_object("b", key).await.unwrap().content;
        assert!((0..8).any(|i| content == format!("v{i}").into_bytes()));
        assert_eq!(store.list_objects("b", "").await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let results = futures::future::join_all((0..8).map(|_| store.ensure_bucket("raw-news"))).await;
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_bucket("b").await.unwrap();

        let err = store.get_object("b", "2025/01/01/1_000000.html").await.unwrap_err();
        assert!(matches!(err, LakeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_object_without_sidecar_has_empty_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/loose.html"), b"x").unwrap();

        let back = store.get_object("b", "loose.html").await.unwrap();
        assert!(back.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_sidecars_and_filters_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_bucket("b").await.unwrap();
        for key in [
            "2025/07/14/2_093012.html",
            "2025/07/14/1_093012.html",
            "2025/07/15/3_000001.html",
        ] {
            store.put_object("b", key, object("x")).await.unwrap();
        }

        assert_eq!(
            store.list_objects("b", "2025/07/14/").await.unwrap(),
            vec!["2025/07/14/1_093012.html", "2025/07/14/2_093012.html"]
        );
        assert_eq!(store.list_objects("b", "").await.unwrap().len(), 3);
        assert!(store.list_objects("missing", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        assert!(matches!(
            store.put_object("b", "../escape.html", object("x")).await,
            Err(LakeError::InvalidKey(_))
        ));
        assert!(matches!(
            store.put_object("b", "/abs.html", object("x")).await,
            Err(LakeError::InvalidKey(_))
        ));
        assert!(matches!(
            store.ensure_bucket("..").await,
            Err(LakeError::InvalidBucket(_))
        ));
    }
}
