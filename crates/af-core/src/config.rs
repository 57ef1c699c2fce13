//! Configuration types and loading
//!
//! `FuConfig` is built once at startup (defaults overlaid with environment
//! variables) and handed to the pipeline; it is never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default Cache-Control header attached to object-store writes (10 years)
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=315360000";

/// Generic content type that triggers a lookup from the filename extension
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content types recognized as images
pub const DEFAULT_IMAGE_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/pjpeg",
    "image/jpg",
    "image/gif",
    "image/png",
    "image/x-png",
    "image/x-ms-bmp",
    "image/bmp",
    "image/x-bmp",
    "image/x-bitmap",
    "image/x-xbitmap",
    "image/x-win-bitmap",
    "image/x-windows-bmp",
    "image/ms-bmp",
    "application/bmp",
    "application/x-bmp",
    "application/x-win-bitmap",
    "application/preview",
    "image/jp_",
    "application/jpg",
    "application/x-jpg",
    "image/pipeg",
    "image/vnd.swiftview-jpeg",
    "application/png",
    "application/x-png",
    "image/gi_",
    "image/x-citrix-pjpeg",
    OCTET_STREAM,
];

/// Main attachment configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FuConfig {
    /// Directory holding staged temp files
    pub tempfile_path: PathBuf,

    /// Content types treated as images (thumbnailable)
    pub image_content_types: Vec<String>,

    /// Storage backend configuration
    pub storage: StorageConfig,

    /// Which image processor to use
    pub processor: ProcessorKind,

    /// Upper bound for a single decode/resize/encode run
    pub processing_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,
    /// Filesystem root (filesystem backend only)
    pub root: PathBuf,
    /// Prefix prepended to every storage location
    pub path_prefix: String,
    pub object_store: Option<ObjectStoreConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
}

fn default_cache_control() -> String {
    DEFAULT_CACHE_CONTROL.to_string()
}

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    FileSystem,
    ObjectStore,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file_system" | "filesystem" | "local" => Ok(StorageKind::FileSystem),
            "object_store" | "s3" => Ok(StorageKind::ObjectStore),
            _ => Err(ConfigError::InvalidValue {
                key: "storage".to_string(),
                message: format!("unknown storage backend: {}", s),
            }),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::FileSystem => write!(f, "file_system"),
            StorageKind::ObjectStore => write!(f, "object_store"),
        }
    }
}

/// Image processor implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// High quality filter, keeps the source format
    #[default]
    Raster,
    /// Fast sampling resize; writes GIF thumbnails as PNG
    Sampling,
    /// No image processing at all
    None,
}

impl FromStr for ProcessorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raster" => Ok(ProcessorKind::Raster),
            "sampling" => Ok(ProcessorKind::Sampling),
            "none" => Ok(ProcessorKind::None),
            _ => Err(ConfigError::InvalidValue {
                key: "processor".to_string(),
                message: format!("unknown image processor: {}", s),
            }),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::FileSystem,
            root: PathBuf::from("."),
            path_prefix: "public/attachments".to_string(),
            object_store: None,
        }
    }
}

impl Default for FuConfig {
    fn default() -> Self {
        Self {
            tempfile_path: PathBuf::from("/tmp/attachment_fu"),
            image_content_types: DEFAULT_IMAGE_CONTENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
            storage: StorageConfig::default(),
            processor: ProcessorKind::Raster,
            processing_timeout_secs: 30,
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(String),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl FuConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup` onto the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("ATTACHMENT_FU_TEMPFILE_PATH") {
            config.tempfile_path = PathBuf::from(path);
        }

        // Storage
        if let Some(backend) = lookup("ATTACHMENT_FU_STORAGE") {
            config.storage.backend = backend.parse()?;
        }
        if let Some(root) = lookup("ATTACHMENT_FU_STORAGE_ROOT") {
            config.storage.root = PathBuf::from(root);
        }
        if let Some(prefix) = lookup("ATTACHMENT_FU_PATH_PREFIX") {
            config.storage.path_prefix = prefix.trim_start_matches('/').to_string();
        }

        // S3-compatible object storage
        if let Some(bucket) = lookup("S3_BUCKET") {
            config.storage.object_store = Some(ObjectStoreConfig {
                bucket,
                region: lookup("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                endpoint: lookup("S3_ENDPOINT"),
                cache_control: lookup("S3_CACHE_CONTROL").unwrap_or_else(default_cache_control),
            });
        }
        if config.storage.backend == StorageKind::ObjectStore && config.storage.object_store.is_none()
        {
            return Err(ConfigError::Missing("S3_BUCKET".to_string()));
        }

        // Processing
        if let Some(processor) = lookup("ATTACHMENT_FU_PROCESSOR") {
            config.processor = processor.parse()?;
        }
        if let Some(timeout) = lookup("ATTACHMENT_FU_PROCESSING_TIMEOUT") {
            config.processing_timeout_secs =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "ATTACHMENT_FU_PROCESSING_TIMEOUT".to_string(),
                    message: format!("expected seconds, got {}", timeout),
                })?;
        }

        debug!(
            tempfile_path = %config.tempfile_path.display(),
            storage = %config.storage.backend,
            "Attachment configuration loaded"
        );

        Ok(config)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}
