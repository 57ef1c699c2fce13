//! Attachment Pipeline
//!
//! Moves an attachment from uploaded bytes to stored object:
//! staging, validation, image processing, thumbnail fan-out, storage
//! commit and cleanup.

use std::path::PathBuf;
use std::sync::Arc;

use af_core::traits::Id;
use af_core::{FuConfig, ValidationErrors, OCTET_STREAM};
use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AttachmentError, AttachmentResult};
use crate::geometry::{Geometry, ResizeSpec};
use crate::hooks::{AttachmentHooks, NoopHooks};
use crate::model::AttachmentRecord;
use crate::options::AttachmentOptions;
use crate::processor::{create_processor, ImageHandle, ImageProcessor, ProcessorError};
use crate::quality::resolve_quality;
use crate::sanitize::thumbnail_name_for;
use crate::storage::{create_backend, StorageBackend};
use crate::store::RecordStore;
use crate::temp::{read_staged, staged_len, StagedFile, TempFileStore};
use crate::thumbnails::{resolve, SizeAccessors};

/// Where uploaded data comes from
#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes(Bytes),
    /// A file already on disk, staged in place
    File(PathBuf),
}

/// An upload as received from the caller
#[derive(Debug, Clone)]
pub struct Upload {
    pub source: UploadSource,
    /// Original filename, before sanitizing
    pub filename: Option<String>,
    /// Content type declared by the client
    pub content_type: Option<String>,
}

impl Upload {
    pub fn bytes(data: impl Into<Bytes>, filename: &str, content_type: &str) -> Self {
        Self {
            source: UploadSource::Bytes(data.into()),
            filename: Some(filename.to_string()),
            content_type: Some(content_type.to_string()),
        }
    }

    pub fn file(path: impl Into<PathBuf>, filename: &str, content_type: &str) -> Self {
        Self {
            source: UploadSource::File(path.into()),
            filename: Some(filename.to_string()),
            content_type: Some(content_type.to_string()),
        }
    }

    /// Content type to record: the declared one, or a guess from the
    /// filename when the client only sent the generic fallback
    fn resolved_content_type(&self) -> String {
        match self.content_type.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() && declared != OCTET_STREAM => {
                declared.to_string()
            }
            _ => self
                .filename
                .as_deref()
                .map(|name| mime_guess::from_path(name).first_or_octet_stream().to_string())
                .unwrap_or_else(|| OCTET_STREAM.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Empty upload; the record was left untouched
    Ignored,
    Staged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was staged
    Unchanged,
    Stored,
}

/// Attachment pipeline
pub struct AttachmentPipeline<St: RecordStore + ?Sized, B: StorageBackend + ?Sized> {
    config: Arc<FuConfig>,
    options: AttachmentOptions,
    store: Arc<St>,
    backend: Arc<B>,
    processor: Option<Arc<dyn ImageProcessor>>,
    temp: TempFileStore,
    accessors: SizeAccessors,
    hooks: Arc<dyn AttachmentHooks>,
}

impl<St: RecordStore + ?Sized> AttachmentPipeline<St, dyn StorageBackend> {
    /// Build a pipeline whose backend and processor come from `config`
    pub fn from_config(
        config: FuConfig,
        options: AttachmentOptions,
        store: Arc<St>,
    ) -> AttachmentResult<Self> {
        let backend = create_backend(&config.storage)?;
        Self::new(config, options, store, backend)
    }
}

impl<St: RecordStore + ?Sized, B: StorageBackend + ?Sized> AttachmentPipeline<St, B> {
    pub fn new(
        config: FuConfig,
        options: AttachmentOptions,
        store: Arc<St>,
        backend: Arc<B>,
    ) -> AttachmentResult<Self> {
        let temp = TempFileStore::new(&config.tempfile_path)?;
        let processor = create_processor(config.processor);

        info!(
            backend = backend.name(),
            processor = processor.as_ref().map(|p| p.name()).unwrap_or("none"),
            tempfile_path = %temp.dir().display(),
            "Attachment pipeline ready"
        );

        Ok(Self {
            config: Arc::new(config),
            options,
            store,
            backend,
            processor,
            temp,
            accessors: SizeAccessors::new(),
            hooks: Arc::new(NoopHooks),
        })
    }

    pub fn with_processor(mut self, processor: Option<Arc<dyn ImageProcessor>>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AttachmentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_accessors(mut self, accessors: SizeAccessors) -> Self {
        self.accessors = accessors;
        self
    }

    pub fn config(&self) -> &FuConfig {
        &self.config
    }

    pub fn options(&self) -> &AttachmentOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<St> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn image_types(&self) -> &[String] {
        &self.config.image_content_types
    }

    /// Stage uploaded data on `record`.
    ///
    /// Zero-length uploads are ignored and leave the record untouched.
    #[instrument(skip(self, record, upload), fields(filename = ?upload.filename))]
    pub async fn ingest(
        &self,
        record: &mut AttachmentRecord,
        upload: Upload,
    ) -> AttachmentResult<IngestOutcome> {
        let size = match &upload.source {
            UploadSource::Bytes(data) => data.len() as u64,
            UploadSource::File(path) => staged_len(path).await?,
        };
        if size == 0 {
            debug!("Ignoring empty upload");
            return Ok(IngestOutcome::Ignored);
        }

        record.set_content_type(&upload.resolved_content_type());
        record.set_filename(upload.filename.as_deref());

        let staged = match upload.source {
            UploadSource::Bytes(data) => self.temp.write(&data, record.filename.as_deref()).await?,
            UploadSource::File(path) => StagedFile::External(path),
        };
        record.stage(staged);
        record.size = Some(size);

        debug!(
            content_type = ?record.content_type,
            size = size,
            "Upload staged"
        );
        Ok(IngestOutcome::Staged)
    }

    /// Persist staged data: validate, process, create thumbnails, then
    /// write to storage if neither the record nor any thumbnail failed.
    ///
    /// On failure the record store is left as it was before the call.
    #[instrument(skip(self, record), fields(id = ?record.id, filename = ?record.filename, thumbnail = ?record.thumbnail))]
    pub async fn commit(&self, record: &mut AttachmentRecord) -> AttachmentResult<CommitOutcome> {
        if !record.save_attachment() {
            debug!("Nothing staged");
            return Ok(CommitOutcome::Unchanged);
        }

        let mut errors = self.options.validate(record, self.image_types());
        if let Some(Err(e)) = record.thumbnail_resize_options.as_ref().map(|s| s.geometry()) {
            errors.add("thumbnail_resize_options", e.to_string());
        }
        if !errors.is_empty() {
            debug!(errors = %errors, "Attachment rejected");
            return Err(AttachmentError::Validation(errors));
        }

        self.process_image(record).await?;

        let previous = match record.id {
            Some(id) => self.store.get(id).await?,
            None => None,
        };
        self.store.save(record).await?;

        match self.store_attachment(record).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.restore_saved(record, previous).await;
                Err(e)
            }
        }
    }

    fn commit_boxed<'a>(
        &'a self,
        record: &'a mut AttachmentRecord,
    ) -> BoxFuture<'a, AttachmentResult<CommitOutcome>> {
        Box::pin(self.commit(record))
    }

    /// Thumbnail fan-out and the gated storage write of an already saved record
    async fn store_attachment(&self, record: &mut AttachmentRecord) -> AttachmentResult<CommitOutcome> {
        let mut errors = ValidationErrors::new();
        // thumbnails never get thumbnails of their own
        if record.parent_id.is_none()
            && record.is_thumbnailable(self.image_types())
            && !self.options.thumbnails.is_empty()
        {
            self.create_thumbnails(record, &mut errors).await?;
        }

        if !errors.is_empty() {
            self.hooks.after_attachment_saved(record);
            return Err(AttachmentError::Validation(errors));
        }

        let data = match record.temp_path() {
            Some(path) => read_staged(path).await?,
            None => return Ok(CommitOutcome::Unchanged),
        };
        let size = data.len();
        let location = self.backend.location(record)?;
        self.backend
            .store(record, data, self.options.cache_control.as_deref())
            .await?;
        record.clear_temp_paths();

        info!(
            id = ?record.id,
            location = %location,
            size = size,
            "Attachment stored"
        );
        self.hooks.after_attachment_saved(record);

        Ok(CommitOutcome::Stored)
    }

    /// Put back the record as it was saved before a failed commit, or drop it
    /// from the store if it was new. The in-memory id is kept so a retry
    /// finds the thumbnails already written for it.
    async fn restore_saved(&self, record: &AttachmentRecord, previous: Option<AttachmentRecord>) {
        let id = match record.id {
            Some(id) => id,
            None => return,
        };
        let restored = match previous {
            Some(mut previous) => self.store.save(&mut previous).await.map(|_| ()),
            None => self.store.delete(id).await,
        };
        match restored {
            Ok(()) => debug!(id = id, "Saved record restored after failed commit"),
            Err(e) => error!(id = id, error = %e, "Could not restore saved record"),
        }
    }

    /// Validation failures of thumbnails are collected on `errors`; any other
    /// failure is returned once every thumbnail was attempted.
    async fn create_thumbnails(
        &self,
        record: &mut AttachmentRecord,
        errors: &mut ValidationErrors,
    ) -> AttachmentResult<()> {
        let staged = self.ensure_temp_file(record).await?;
        let resolved = resolve(&self.options.thumbnails, record, &self.accessors);
        debug!(count = resolved.len(), "Creating thumbnails");

        let mut failure = None;
        for thumbnail in resolved {
            match self
                .create_or_update_thumbnail(record, &staged, &thumbnail.suffix, thumbnail.size)
                .await
            {
                Ok(_) => {}
                Err(AttachmentError::Validation(inner)) => {
                    let message = inner.full_messages().join(", ");
                    warn!(suffix = %thumbnail.suffix, error = %message, "Thumbnail rejected");
                    errors.add_base(format!("error saving thumbnail {}: {}", thumbnail.suffix, message));
                }
                Err(e) => {
                    error!(suffix = %thumbnail.suffix, error = %e, "Thumbnail failed");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Create or refresh the thumbnail of `parent` with the given suffix
    /// from `staged` image data.
    #[instrument(skip(self, parent, staged, size), fields(parent_id = ?parent.id, size = %size))]
    pub async fn create_or_update_thumbnail(
        &self,
        parent: &AttachmentRecord,
        staged: &StagedFile,
        suffix: &str,
        size: ResizeSpec,
    ) -> AttachmentResult<AttachmentRecord> {
        if !parent.is_thumbnailable(self.image_types()) {
            return Err(AttachmentError::Thumbnail(
                "can't create a thumbnail if the content type is not an image or the record is itself a thumbnail"
                    .to_string(),
            ));
        }
        let parent_id = parent
            .id
            .ok_or_else(|| AttachmentError::Thumbnail("parent has not been saved".to_string()))?;
        let parent_filename = parent
            .filename
            .as_deref()
            .ok_or_else(|| AttachmentError::Thumbnail("parent has no filename".to_string()))?;

        let mut thumb = match self.store.find_thumbnail(parent_id, suffix).await? {
            Some(existing) => existing,
            None => AttachmentRecord::thumbnail_of(parent_id, suffix),
        };

        let filename = thumbnail_name_for(parent_filename, Some(suffix), |ext| match &self.processor {
            Some(processor) => processor.thumbnail_extension(ext),
            None => ext.to_string(),
        });
        let content_type = match (&parent.content_type, thumb_extension_changed(parent_filename, &filename)) {
            (_, true) => mime_guess::from_path(&filename).first_or_octet_stream().to_string(),
            (Some(ct), false) => ct.clone(),
            (None, false) => OCTET_STREAM.to_string(),
        };

        thumb.clear_temp_paths();
        thumb.stage(staged.clone());
        thumb.set_content_type(&content_type);
        thumb.set_filename(Some(filename.as_str()));
        if thumb.filename.as_deref() == Some(parent_filename) {
            let mut errors = ValidationErrors::new();
            errors.add("filename", "would overwrite the original");
            return Err(AttachmentError::Validation(errors));
        }
        thumb.size = Some(staged_len(staged.path()).await?);
        thumb.thumbnail_resize_options = Some(size);
        thumb.owner_type = parent.owner_type.clone();
        thumb.owner_id = parent.owner_id;

        self.hooks.before_thumbnail_saved(&mut thumb);
        self.commit_boxed(&mut thumb).await?;

        Ok(thumb)
    }

    /// Decode the latest staged image, record its dimensions and apply the
    /// configured resize.
    async fn process_image(&self, record: &mut AttachmentRecord) -> AttachmentResult<()> {
        let processor = match &self.processor {
            Some(processor) if record.is_image(self.image_types()) => processor.clone(),
            _ => return Ok(()),
        };
        let source = match record.temp_path() {
            Some(path) => path.to_path_buf(),
            None => return Ok(()),
        };

        let spec = if record.is_thumbnail() {
            record.thumbnail_resize_options.clone()
        } else {
            self.options.resize_to.clone()
        };
        let geometry = spec
            .map(|s| s.geometry())
            .transpose()
            .map_err(ProcessorError::from)?;

        let limit = self.config.processing_timeout();
        let processed = tokio::time::timeout(
            limit,
            self.decode_and_resize(processor.clone(), source, geometry, record),
        )
        .await
        .map_err(|_| {
            warn!(timeout = ?limit, "Image processing timed out");
            AttachmentError::ProcessingTimeout(limit)
        })??;

        if let Some((handle, data)) = processed {
            let staged = self.temp.write(&data, record.filename.as_deref()).await?;
            record.stage(staged);
            record.size = Some(data.len() as u64);
            let (width, height) = processor.dimensions(&handle);
            record.width = Some(width);
            record.height = Some(height);
            debug!(width = width, height = height, size = data.len(), "Image resized");
            self.hooks.after_resize(record, &handle);
        }

        Ok(())
    }

    async fn decode_and_resize(
        &self,
        processor: Arc<dyn ImageProcessor>,
        source: PathBuf,
        geometry: Option<Geometry>,
        record: &mut AttachmentRecord,
    ) -> AttachmentResult<Option<(ImageHandle, Bytes)>> {
        let opener = processor.clone();
        let opened = tokio::task::spawn_blocking(move || opener.open(&source))
            .await
            .map_err(|e| ProcessorError::Task(e.to_string()))?;
        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                // undecodable data is stored as uploaded
                warn!(error = %e, "Could not decode image, skipping processing");
                return Ok(None);
            }
        };

        let (width, height) = processor.dimensions(&handle);
        record.width = Some(width);
        record.height = Some(height);

        let plan = match geometry.and_then(|g| g.plan(width, height)) {
            Some(plan) => plan,
            None => return Ok(None),
        };
        let quality = self
            .options
            .jpeg_quality
            .as_ref()
            .and_then(|q| resolve_quality(q, record, true))
            .map(|q| q as u8);

        let resized = tokio::task::spawn_blocking(move || {
            let resized = processor.resize(handle, &plan);
            let data = processor.encode(&resized, quality)?;
            Ok::<_, ProcessorError>((resized, data))
        })
        .await
        .map_err(|e| ProcessorError::Task(e.to_string()))??;

        Ok(Some(resized))
    }

    /// The latest staged file, or the stored bytes written to a new one
    pub async fn ensure_temp_file(&self, record: &mut AttachmentRecord) -> AttachmentResult<StagedFile> {
        if let Some(staged) = record.temp_paths().first() {
            return Ok(staged.clone());
        }

        let data = self.backend.retrieve(record).await?;
        let staged = self.temp.write(&data, record.filename.as_deref()).await?;
        record.stage(staged.clone());
        Ok(staged)
    }

    /// Stored bytes of `record`
    #[instrument(skip(self, record), fields(id = ?record.id))]
    pub async fn retrieve(&self, record: &AttachmentRecord) -> AttachmentResult<Bytes> {
        Ok(self.backend.retrieve(record).await?)
    }

    /// Load a record by id
    pub async fn find(&self, id: Id) -> AttachmentResult<AttachmentRecord> {
        self.store.get(id).await?.ok_or(AttachmentError::NotFound(id))
    }

    /// Regenerate every thumbnail of `record` from its stored bytes
    #[instrument(skip(self, record), fields(id = ?record.id))]
    pub async fn rebuild_thumbnails(&self, record: &mut AttachmentRecord) -> AttachmentResult<CommitOutcome> {
        if !record.is_thumbnailable(self.image_types()) {
            return Err(AttachmentError::Thumbnail(
                "only original images have thumbnails".to_string(),
            ));
        }
        self.ensure_temp_file(record).await?;
        self.commit(record).await
    }

    /// Delete `record`, its thumbnails and all stored bytes.
    ///
    /// Thumbnails go first so a failure never leaves them orphaned.
    #[instrument(skip(self, record), fields(id = ?record.id))]
    pub async fn destroy(&self, record: &AttachmentRecord) -> AttachmentResult<()> {
        let id = match record.id {
            Some(id) => id,
            None => return Ok(()),
        };

        if record.parent_id.is_none() {
            for thumbnail in self.store.thumbnails_of(id).await? {
                self.destroy_one(&thumbnail).await?;
            }
        }
        self.destroy_one(record).await?;

        info!(id = id, "Attachment destroyed");
        Ok(())
    }

    async fn destroy_one(&self, record: &AttachmentRecord) -> AttachmentResult<()> {
        if let Some(id) = record.id {
            self.store.delete(id).await?;
        }
        self.backend.delete(record).await?;
        debug!(id = ?record.id, thumbnail = ?record.thumbnail, "Record and stored bytes deleted");
        Ok(())
    }
}

fn thumb_extension_changed(original: &str, thumbnail: &str) -> bool {
    let (_, original_ext) = crate::sanitize::split_extension(original);
    let (_, thumb_ext) = crate::sanitize::split_extension(thumbnail);
    !original_ext.eq_ignore_ascii_case(thumb_ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_resolution() {
        let declared = Upload::bytes("x", "photo.png", " image/png ");
        assert_eq!(declared.resolved_content_type(), "image/png");

        let fallback = Upload::bytes("x", "photo.png", "application/octet-stream");
        assert_eq!(fallback.resolved_content_type(), "image/png");

        let unknown = Upload::bytes("x", "blob.unknownext", "application/octet-stream");
        assert_eq!(unknown.resolved_content_type(), OCTET_STREAM);

        let trusted = Upload::bytes("x", "photo.png", "text/plain");
        assert_eq!(trusted.resolved_content_type(), "text/plain");
    }

    #[test]
    fn test_thumb_extension_changed() {
        assert!(!thumb_extension_changed("a.gif", "a_thumb.gif"));
        assert!(thumb_extension_changed("a.gif", "a_thumb.png"));
    }
}
