//! Pipeline extension points
//!
//! Host applications implement [`AttachmentHooks`] to adjust records while
//! they move through a commit. Every method defaults to doing nothing.

use crate::model::AttachmentRecord;
use crate::processor::ImageHandle;

pub trait AttachmentHooks: Send + Sync {
    /// Called for each thumbnail record right before it is committed
    fn before_thumbnail_saved(&self, _thumbnail: &mut AttachmentRecord) {}

    /// Called after an image was resized and re-staged
    fn after_resize(&self, _record: &mut AttachmentRecord, _image: &ImageHandle) {}

    /// Called once the record's bytes reached the storage backend
    fn after_attachment_saved(&self, _record: &AttachmentRecord) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl AttachmentHooks for NoopHooks {}
