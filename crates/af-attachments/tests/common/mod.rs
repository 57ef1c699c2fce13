#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use af_attachments::{
    AttachmentOptions, AttachmentPipeline, AttachmentRecord, FilesystemBackend, MemoryBackend,
    MemoryRecordStore, StorageBackend, StorageError, StorageResult,
};
use af_core::FuConfig;
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub type TestPipeline = AttachmentPipeline<MemoryRecordStore, FilesystemBackend>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("af_attachments=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryRecordStore>,
    pub backend: Arc<FilesystemBackend>,
    pub pipeline: TestPipeline,
}

impl Harness {
    pub fn new(options: AttachmentOptions) -> Self {
        Self::with_config(options, |_| {})
    }

    pub fn with_config(options: AttachmentOptions, adjust: impl FnOnce(&mut FuConfig)) -> Self {
        init_tracing();

        let dir = tempfile::tempdir().unwrap();
        let mut config = FuConfig {
            tempfile_path: dir.path().join("tmp"),
            ..FuConfig::default()
        };
        adjust(&mut config);

        let store = Arc::new(MemoryRecordStore::new());
        let backend = Arc::new(FilesystemBackend::new(dir.path(), "public/attachments").unwrap());
        let pipeline = AttachmentPipeline::new(config, options, store.clone(), backend.clone()).unwrap();

        Self {
            dir,
            store,
            backend,
            pipeline,
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        self.dir.path().join("public/attachments")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    /// Every file under the storage root, relative to it
    pub fn stored_files(&self) -> Vec<String> {
        let root = self.storage_root();
        let mut files = Vec::new();
        collect_files(&root, &root, &mut files);
        files.sort();
        files
    }

    pub fn temp_file_count(&self) -> usize {
        std::fs::read_dir(self.temp_dir()).map(|d| d.count()).unwrap_or(0)
    }
}

/// Build a pipeline over `backend` with a fresh record store, staging under `dir`
pub fn pipeline_with<B: StorageBackend>(
    dir: &Path,
    options: AttachmentOptions,
    backend: Arc<B>,
) -> (Arc<MemoryRecordStore>, AttachmentPipeline<MemoryRecordStore, B>) {
    init_tracing();
    let config = FuConfig {
        tempfile_path: dir.join("tmp"),
        ..FuConfig::default()
    };
    let store = Arc::new(MemoryRecordStore::new());
    let pipeline = AttachmentPipeline::new(config, options, store.clone(), backend).unwrap();
    (store, pipeline)
}

/// In-memory storage that logs every write and delete by filename and can be
/// told to fail them for one filename
#[derive(Default)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    fail_store: Mutex<Option<String>>,
    fail_delete: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl FlakyBackend {
    pub fn failing_store(filename: &str) -> Self {
        let backend = Self::default();
        *backend.fail_store.lock().unwrap() = Some(filename.to_string());
        backend
    }

    pub fn failing_delete(filename: &str) -> Self {
        let backend = Self::default();
        *backend.fail_delete.lock().unwrap() = Some(filename.to_string());
        backend
    }

    pub fn heal(&self) {
        *self.fail_store.lock().unwrap() = None;
        *self.fail_delete.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, op: &str, rule: &Mutex<Option<String>>, record: &AttachmentRecord) -> StorageResult<()> {
        let filename = record.filename.clone().unwrap_or_default();
        self.calls.lock().unwrap().push(format!("{} {}", op, filename));
        if rule.lock().unwrap().as_deref() == Some(filename.as_str()) {
            return Err(StorageError::BackendError("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn store(
        &self,
        record: &AttachmentRecord,
        data: Bytes,
        cache_control: Option<&str>,
    ) -> StorageResult<()> {
        self.check("store", &self.fail_store, record)?;
        self.inner.store(record, data, cache_control).await
    }

    async fn retrieve(&self, record: &AttachmentRecord) -> StorageResult<Bytes> {
        self.inner.retrieve(record).await
    }

    async fn delete(&self, record: &AttachmentRecord) -> StorageResult<()> {
        self.check("delete", &self.fail_delete, record)?;
        self.inner.delete(record).await
    }

    fn location(&self, record: &AttachmentRecord) -> StorageResult<String> {
        self.inner.location(record)
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else {
            out.push(path.strip_prefix(root).unwrap().to_string_lossy().into_owned());
        }
    }
}

pub fn encode_image(width: u32, height: u32, format: ImageFormat) -> Bytes {
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 5 % 256) as u8, (y * 3 % 256) as u8, 120, 255])
    });
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(pixels).to_rgb8()),
        _ => DynamicImage::ImageRgba8(pixels),
    };
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
    Bytes::from(buffer)
}

pub fn png(width: u32, height: u32) -> Bytes {
    encode_image(width, height, ImageFormat::Png)
}

pub fn gif(width: u32, height: u32) -> Bytes {
    encode_image(width, height, ImageFormat::Gif)
}

pub fn jpeg(width: u32, height: u32) -> Bytes {
    encode_image(width, height, ImageFormat::Jpeg)
}

pub fn dimensions_of(data: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(data).unwrap();
    (image.width(), image.height())
}
