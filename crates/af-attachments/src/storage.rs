//! Storage Backends
//!
//! Persist the final bytes of an attachment at a location derived from the
//! record identity. Thumbnails are stored next to their parent because the
//! location uses `parent_id` when one is set.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use af_core::traits::Id;
use af_core::{StorageConfig, StorageKind, DEFAULT_CACHE_CONTROL, OCTET_STREAM};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, DynObjectStore, ObjectStoreExt, PutOptions, PutPayload};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

use crate::model::AttachmentRecord;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Record has no id yet")]
    Unsaved,
    #[error("Storage configuration error: {0}")]
    Config(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage trait - unified interface for storage backends
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write the whole object for `record`, replacing any previous one.
    ///
    /// `cache_control` overrides the backend default where the backend
    /// supports object metadata.
    async fn store(
        &self,
        record: &AttachmentRecord,
        data: Bytes,
        cache_control: Option<&str>,
    ) -> StorageResult<()>;

    /// Read back the stored object
    async fn retrieve(&self, record: &AttachmentRecord) -> StorageResult<Bytes>;

    /// Delete the stored object; deleting a missing object succeeds
    async fn delete(&self, record: &AttachmentRecord) -> StorageResult<()>;

    /// Backend specific location of the object (path or key)
    fn location(&self, record: &AttachmentRecord) -> StorageResult<String>;

    /// Get storage name for logging
    fn name(&self) -> &str;
}

/// The id a record is filed under
fn path_id(record: &AttachmentRecord) -> StorageResult<Id> {
    record.parent_id.or(record.id).ok_or(StorageError::Unsaved)
}

fn checked_filename(record: &AttachmentRecord) -> StorageResult<&str> {
    match record.filename.as_deref() {
        None | Some("") => Err(StorageError::InvalidPath("missing filename".to_string())),
        Some(name) if name == "." || name == ".." || name.contains(['/', '\\']) => {
            Err(StorageError::InvalidPath(name.to_string()))
        }
        Some(name) => Ok(name),
    }
}

/// `42` -> `["0000", "0042"]`
pub fn partition_id(id: Id) -> Vec<String> {
    let padded = format!("{:08}", id);
    padded
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

/// Files under `<root>/<path_prefix>/<partitioned id>/<filename>`
pub struct FilesystemBackend {
    /// Root directory for storage
    root: PathBuf,
    path_prefix: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl AsRef<Path>, path_prefix: &str) -> StorageResult<Self> {
        let path_prefix = PathBuf::from(path_prefix.trim_start_matches('/'));
        // Prevent directory traversal
        if path_prefix
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(path_prefix.display().to_string()));
        }

        Ok(Self {
            root: root.as_ref().to_path_buf(),
            path_prefix,
        })
    }

    /// Full path of the file for `record`
    pub fn full_path(&self, record: &AttachmentRecord) -> StorageResult<PathBuf> {
        let mut path = self.root.join(&self.path_prefix);
        for part in partition_id(path_id(record)?) {
            path.push(part);
        }
        path.push(checked_filename(record)?);
        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    #[instrument(skip(self, record, data, _cache_control), fields(storage = "file_system", id = ?record.id))]
    async fn store(
        &self,
        record: &AttachmentRecord,
        data: Bytes,
        _cache_control: Option<&str>,
    ) -> StorageResult<()> {
        let path = self.full_path(record)?;
        self.ensure_parent(&path).await?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        debug!(path = ?path, size = data.len(), "File stored");
        Ok(())
    }

    #[instrument(skip(self, record), fields(storage = "file_system", id = ?record.id))]
    async fn retrieve(&self, record: &AttachmentRecord) -> StorageResult<Bytes> {
        let path = self.full_path(record)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, record), fields(storage = "file_system", id = ?record.id))]
    async fn delete(&self, record: &AttachmentRecord) -> StorageResult<()> {
        let path = self.full_path(record)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "File deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self, record: &AttachmentRecord) -> StorageResult<String> {
        Ok(self.full_path(record)?.display().to_string())
    }

    fn name(&self) -> &str {
        "file_system"
    }
}

/// Objects under `<path_prefix>/<parent_id or id>/<filename>` in any
/// `object_store` implementation (S3 in production)
pub struct ObjectStoreBackend {
    store: Arc<DynObjectStore>,
    bucket: String,
    path_prefix: String,
    cache_control: String,
}

impl ObjectStoreBackend {
    /// Wrap an existing store
    pub fn new(store: Arc<DynObjectStore>, bucket: impl Into<String>, path_prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            path_prefix: path_prefix.trim_matches('/').to_string(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
        }
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = cache_control.into();
        self
    }

    /// Build an S3 backed store from configuration
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let s3 = config
            .object_store
            .as_ref()
            .ok_or_else(|| StorageError::Config("object store settings missing".to_string()))?;

        let mut builder = AmazonS3Builder::from_env()
            .with_region(s3.region.clone())
            .with_bucket_name(s3.bucket.clone());

        if let Some(ref endpoint) = s3.endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        info!(bucket = %s3.bucket, region = %s3.region, "Object store backend initialized");

        Ok(Self::new(Arc::new(store), s3.bucket.clone(), &config.path_prefix)
            .with_cache_control(s3.cache_control.clone()))
    }

    /// Object key for `record`
    pub fn key(&self, record: &AttachmentRecord) -> StorageResult<String> {
        let id = path_id(record)?;
        let filename = checked_filename(record)?;
        Ok(if self.path_prefix.is_empty() {
            format!("{}/{}", id, filename)
        } else {
            format!("{}/{}/{}", self.path_prefix, id, filename)
        })
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    #[instrument(skip(self, record, data, cache_control), fields(storage = "object_store", id = ?record.id))]
    async fn store(
        &self,
        record: &AttachmentRecord,
        data: Bytes,
        cache_control: Option<&str>,
    ) -> StorageResult<()> {
        let key = self.key(record)?;
        let size = data.len();
        let start = Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::CacheControl,
            cache_control.unwrap_or(&self.cache_control).to_string().into(),
        );
        attributes.insert(
            Attribute::ContentType,
            record
                .content_type
                .as_deref()
                .unwrap_or(OCTET_STREAM)
                .to_string()
                .into(),
        );
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let location = ObjectPath::from(key.clone());
        object_store::ObjectStore::put_opts(&*self.store, &location, PutPayload::from(data), opts)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object upload failed"
                );
                StorageError::BackendError(e.to_string())
            })?;

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object upload successful"
        );
        Ok(())
    }

    #[instrument(skip(self, record), fields(storage = "object_store", id = ?record.id))]
    async fn retrieve(&self, record: &AttachmentRecord) -> StorageResult<Bytes> {
        let key = self.key(record)?;
        let location = ObjectPath::from(key.clone());

        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound(key.clone()),
            other => {
                error!(error = %other, bucket = %self.bucket, key = %key, "Object download failed");
                StorageError::BackendError(other.to_string())
            }
        })?;

        result
            .bytes()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))
    }

    #[instrument(skip(self, record), fields(storage = "object_store", id = ?record.id))]
    async fn delete(&self, record: &AttachmentRecord) -> StorageResult<()> {
        let key = self.key(record)?;
        let location = ObjectPath::from(key.clone());

        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                debug!(bucket = %self.bucket, key = %key, "Object deleted");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, bucket = %self.bucket, key = %key, "Object delete failed");
                Err(StorageError::BackendError(e.to_string()))
            }
        }
    }

    fn location(&self, record: &AttachmentRecord) -> StorageResult<String> {
        self.key(record)
    }

    fn name(&self) -> &str {
        "object_store"
    }
}

/// A stored object in [`MemoryBackend`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

/// In-memory storage for testing
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn key(record: &AttachmentRecord) -> StorageResult<String> {
        Ok(format!("{}/{}", path_id(record)?, checked_filename(record)?))
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn store(
        &self,
        record: &AttachmentRecord,
        data: Bytes,
        cache_control: Option<&str>,
    ) -> StorageResult<()> {
        let key = Self::key(record)?;
        let object = StoredObject {
            data,
            content_type: record.content_type.clone(),
            cache_control: cache_control.map(String::from),
        };
        self.objects.write().await.insert(key, object);
        Ok(())
    }

    async fn retrieve(&self, record: &AttachmentRecord) -> StorageResult<Bytes> {
        let key = Self::key(record)?;
        self.objects
            .read()
            .await
            .get(&key)
            .map(|object| object.data.clone())
            .ok_or(StorageError::NotFound(key))
    }

    async fn delete(&self, record: &AttachmentRecord) -> StorageResult<()> {
        let key = Self::key(record)?;
        self.objects.write().await.remove(&key);
        Ok(())
    }

    fn location(&self, record: &AttachmentRecord) -> StorageResult<String> {
        Self::key(record)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Create the configured storage backend
pub fn create_backend(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config.backend {
        StorageKind::FileSystem => {
            info!(root = %config.root.display(), prefix = %config.path_prefix, "Using filesystem storage");
            Ok(Arc::new(FilesystemBackend::new(&config.root, &config.path_prefix)?))
        }
        StorageKind::ObjectStore => Ok(Arc::new(ObjectStoreBackend::from_config(config)?)),
    }
}
