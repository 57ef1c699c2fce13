//! # af-attachments
//!
//! File attachment handling for AttachmentFu RS.
//!
//! ## Features
//!
//! - Upload staging in a process-wide temp directory
//! - Size and content type acceptance rules
//! - Image resizing and thumbnail fan-out, with owner-specific thumbnail sets
//! - Storage backends (local filesystem, S3-compatible object stores)
//!
//! ## Example
//!
//! ```rust,ignore
//! use af_attachments::{AttachmentOptions, AttachmentPipeline, AttachmentRecord, MemoryRecordStore, Upload};
//! use af_core::FuConfig;
//! use std::sync::Arc;
//!
//! let options = AttachmentOptions::from_yaml_str("content_type: [image]\nthumbnails:\n  thumb: [50, 50]\n")?;
//! let pipeline = AttachmentPipeline::from_config(FuConfig::from_env()?, options, Arc::new(MemoryRecordStore::new()))?;
//!
//! let mut photo = AttachmentRecord::new().owned_by("Profile", 1);
//! pipeline.ingest(&mut photo, Upload::bytes(data, "Me at the beach.png", "image/png")).await?;
//! pipeline.commit(&mut photo).await?;
//! ```

pub mod error;
pub mod geometry;
pub mod hooks;
pub mod model;
pub mod options;
pub mod pipeline;
pub mod processor;
pub mod quality;
pub mod sanitize;
pub mod storage;
pub mod store;
pub mod temp;
pub mod thumbnails;

pub use error::{AttachmentError, AttachmentResult, ErrorKind};
pub use geometry::{Geometry, GeometryError, Modifier, ResizePlan, ResizeSpec};
pub use hooks::{AttachmentHooks, NoopHooks};
pub use model::{AttachmentRecord, ImageDimensions};
pub use options::AttachmentOptions;
pub use pipeline::{AttachmentPipeline, CommitOutcome, IngestOutcome, Upload, UploadSource};
pub use processor::{
    create_processor, ImageHandle, ImageProcessor, ProcessorError, ProcessorResult,
    RasterProcessor, SamplingProcessor,
};
pub use quality::{resolve_quality, JpegQuality};
pub use sanitize::{sanitize_filename, thumbnail_name_for};
pub use storage::{
    create_backend, FilesystemBackend, MemoryBackend, ObjectStoreBackend, StorageBackend,
    StorageError, StorageResult, StoredObject,
};
pub use store::{MemoryRecordStore, RecordStore};
pub use temp::{StagedFile, TempFileStore};
pub use thumbnails::{
    owner_matches, resolve, OrderedMap, ResolvedThumbnail, SizeAccessor, SizeAccessors, SizeSpec,
    ThumbnailConfig,
};
