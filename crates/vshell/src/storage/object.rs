//! Object-store backed storage provider.
//!
//! Each node is two objects in a bucket: `{prefix}/nodes{path}` holds the
//! [`NodeInfo`] as JSON and `{prefix}/content{path}` holds file bytes.
//! Directories have no content object. The client is abstracted behind
//! [`ObjectStore`] so S3-compatible services and tests plug in the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, RwLock};

use super::{
    CleanupStats, NodeInfo, StorageError, StorageProvider, StorageResult, StorageStats,
    cleanup_by_delete, now_millis,
};
use crate::path;

/// One entry returned by [`ObjectStore::list_objects`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Full object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
}

/// Minimal object-store client used by [`ObjectStorageProvider`].
///
/// Errors from the service (network, auth, throttling) must be reported as
/// [`StorageError::Backend`]; a missing object is `Ok(None)`, not an error.
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Create the bucket if it does not exist.
    fn ensure_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Store `body` under `key`, replacing any existing object.
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StorageResult<()>;

    /// Fetch the object at `key`.
    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Remove the object at `key`. Removing a missing key succeeds.
    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Every object whose key starts with `prefix`, in key order.
    fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectSummary>>;
}

/// Process-local [`ObjectStore`] with S3 semantics.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    /// Create an empty store with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    fn no_such_bucket(bucket: &str) -> StorageError {
        StorageError::Backend(format!("NoSuchBucket: {}", bucket))
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().map_err(|_| StorageError::LockPoisoned)?;
        buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StorageResult<()> {
        let mut buckets = self.buckets.write().map_err(|_| StorageError::LockPoisoned)?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let buckets = self.buckets.read().map_err(|_| StorageError::LockPoisoned)?;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        Ok(objects.get(key).cloned())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().map_err(|_| StorageError::LockPoisoned)?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        objects.remove(key);
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        let buckets = self.buckets.read().map_err(|_| StorageError::LockPoisoned)?;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, body)| ObjectSummary {
                key: key.clone(),
                size: body.len() as u64,
            })
            .collect())
    }
}

/// Storage provider mapping the tree onto an object store bucket.
#[derive(Debug)]
pub struct ObjectStorageProvider<S: ObjectStore = InMemoryObjectStore> {
    store: S,
    bucket: String,
    prefix: String,
    // Object stores have no multi-key transactions; mutations serialize here.
    mutation: Mutex<()>,
}

impl<S: ObjectStore> ObjectStorageProvider<S> {
    /// Create a provider over `store`, keeping every key under `prefix`
    /// inside `bucket`. Leading and trailing slashes on `prefix` are ignored.
    pub fn new(store: S, bucket: impl Into<String>, prefix: impl AsRef<str>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.as_ref().trim_matches('/').to_string(),
            mutation: Mutex::new(()),
        }
    }

    /// Bucket holding this provider's objects.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix inside the bucket.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The underlying client.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn key(&self, kind: &str, path: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}{}", kind, path)
        } else {
            format!("{}/{}{}", self.prefix, kind, path)
        }
    }

    fn meta_key(&self, path: &str) -> String {
        self.key("nodes", path)
    }

    fn content_key(&self, path: &str) -> String {
        self.key("content", path)
    }

    fn children_prefix(&self, dir: &str) -> String {
        if dir == "/" {
            self.meta_key("/")
        } else {
            self.meta_key(&format!("{}/", dir))
        }
    }

    fn load(&self, path: &str) -> StorageResult<Option<NodeInfo>> {
        let Some(body) = self.store.get_object(&self.bucket, &self.meta_key(path))? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&body);
        Ok(Some(NodeInfo::from_json(&text)?))
    }

    fn store_meta(&self, path: &str, info: &NodeInfo) -> StorageResult<()> {
        self.store
            .put_object(&self.bucket, &self.meta_key(path), info.to_json()?.into_bytes())
    }

    fn children(&self, dir: &str) -> StorageResult<Vec<String>> {
        let prefix = self.children_prefix(dir);
        Ok(self
            .store
            .list_objects(&self.bucket, &prefix)?
            .into_iter()
            .filter_map(|obj| {
                let rest = obj.key.strip_prefix(&prefix)?;
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, ()>> {
        self.mutation.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl<S: ObjectStore> StorageProvider for ObjectStorageProvider<S> {
    fn name(&self) -> &str {
        "s3"
    }

    fn initialize(&self) -> StorageResult<bool> {
        let _guard = self.lock()?;
        self.store.ensure_bucket(&self.bucket)?;
        if self.load("/")?.is_none() {
            self.store_meta("/", &NodeInfo::root())?;
        }
        tracing::debug!(bucket = %self.bucket, prefix = %self.prefix, "s3: initialized");
        Ok(true)
    }

    fn get_node_info(&self, path: &str) -> StorageResult<Option<NodeInfo>> {
        self.load(&path::normalize(path))
    }

    fn create_node(&self, node: &NodeInfo) -> StorageResult<bool> {
        let _guard = self.lock()?;
        if !super::can_create(self, node)? {
            return Ok(false);
        }
        let mut info = node.clone();
        info.parent_path = path::normalize(&node.parent_path);
        let full = info.get_path();
        if !info.is_dir {
            info.size = Some(0);
            self.store
                .put_object(&self.bucket, &self.content_key(&full), Vec::new())?;
        }
        self.store_meta(&full, &info)?;
        tracing::debug!(path = %full, is_dir = info.is_dir, "s3: created node");
        Ok(true)
    }

    fn list_directory(&self, path: &str) -> StorageResult<Vec<String>> {
        let path = path::normalize(path);
        if !self.load(&path)?.is_some_and(|n| n.is_dir) {
            return Ok(Vec::new());
        }
        self.children(&path)
    }

    fn write_file(&self, path: &str, content: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        let _guard = self.lock()?;
        let Some(mut info) = self.load(&path)? else {
            return Ok(false);
        };
        if info.is_dir {
            return Ok(false);
        }
        self.store.put_object(
            &self.bucket,
            &self.content_key(&path),
            content.as_bytes().to_vec(),
        )?;
        info.size = Some(content.len() as u64);
        info.modified_at = now_millis();
        self.store_meta(&path, &info)?;
        Ok(true)
    }

    fn read_file(&self, path: &str) -> StorageResult<Option<String>> {
        let path = path::normalize(path);
        match self.load(&path)? {
            Some(info) if !info.is_dir => {}
            _ => return Ok(None),
        }
        let body = self
            .store
            .get_object(&self.bucket, &self.content_key(&path))?
            .unwrap_or_default();
        Ok(Some(String::from_utf8_lossy(&body).into_owned()))
    }

    fn delete_node(&self, path: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        if path == "/" {
            return Ok(false);
        }
        let _guard = self.lock()?;
        let Some(info) = self.load(&path)? else {
            return Ok(false);
        };
        if info.is_dir {
            if !self.children(&path)?.is_empty() {
                return Ok(false);
            }
        } else {
            self.store
                .delete_object(&self.bucket, &self.content_key(&path))?;
        }
        self.store.delete_object(&self.bucket, &self.meta_key(&path))?;
        Ok(true)
    }

    fn touch(&self, path: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        let _guard = self.lock()?;
        let Some(mut info) = self.load(&path)? else {
            return Ok(false);
        };
        info.modified_at = now_millis();
        self.store_meta(&path, &info)?;
        Ok(true)
    }

    fn get_storage_stats(&self) -> StorageResult<StorageStats> {
        let mut stats = StorageStats {
            provider: self.name().to_string(),
            ..StorageStats::default()
        };
        for obj in self.store.list_objects(&self.bucket, &self.meta_key(""))? {
            let Some(body) = self.store.get_object(&self.bucket, &obj.key)? else {
                continue;
            };
            let info = NodeInfo::from_json(&String::from_utf8_lossy(&body))?;
            if info.is_dir {
                stats.directory_count += 1;
            } else {
                stats.file_count += 1;
                stats.total_size_bytes += info.size.unwrap_or(0);
            }
        }
        stats
            .extra
            .insert("bucket".to_string(), self.bucket.clone().into());
        stats
            .extra
            .insert("prefix".to_string(), self.prefix.clone().into());
        Ok(stats)
    }

    fn cleanup(&self) -> StorageResult<CleanupStats> {
        let stats = cleanup_by_delete(self)?;
        tracing::debug!(
            files_removed = stats.files_removed,
            bytes_freed = stats.bytes_freed,
            "s3: cleanup"
        );
        Ok(stats)
    }
}
