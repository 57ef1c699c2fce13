//! Attachment Model
//!
//! One uploaded file, or one thumbnail derived from it.

use std::path::Path;

use af_core::traits::{Id, Identifiable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::ResizeSpec;
use crate::sanitize::sanitize_filename;
use crate::temp::StagedFile;

/// An attachment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// Attachment ID, assigned by the record store on first save
    pub id: Option<Id>,
    /// Original attachment this thumbnail was derived from
    pub parent_id: Option<Id>,
    /// Polymorphic owner type (e.g. "Profile"), when the owning relation is polymorphic
    pub owner_type: Option<String>,
    /// Polymorphic owner ID
    pub owner_id: Option<Id>,
    /// Sanitized filename
    pub filename: Option<String>,
    /// MIME content type
    pub content_type: Option<String>,
    /// File size in bytes
    pub size: Option<u64>,
    /// Image width (images only)
    pub width: Option<u32>,
    /// Image height (images only)
    pub height: Option<u32>,
    /// Thumbnail suffix; `None` for the original upload
    pub thumbnail: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Staged temp files, most recent first
    #[serde(skip)]
    temp_paths: Vec<StagedFile>,
    /// Resize applied to this record when it is a thumbnail
    #[serde(skip)]
    pub thumbnail_resize_options: Option<ResizeSpec>,
}

impl Default for AttachmentRecord {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: None,
            parent_id: None,
            owner_type: None,
            owner_id: None,
            filename: None,
            content_type: None,
            size: None,
            width: None,
            height: None,
            thumbnail: None,
            created_at: now,
            updated_at: now,
            temp_paths: Vec::new(),
            thumbnail_resize_options: None,
        }
    }
}

impl Identifiable for AttachmentRecord {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl AttachmentRecord {
    /// Create an empty, unsaved attachment
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize a thumbnail record keyed by (parent, suffix)
    pub fn thumbnail_of(parent_id: Id, suffix: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id),
            thumbnail: Some(suffix.into()),
            ..Self::default()
        }
    }

    /// Set the polymorphic owner
    pub fn owned_by(mut self, owner_type: impl Into<String>, owner_id: Id) -> Self {
        self.owner_type = Some(owner_type.into());
        self.owner_id = Some(owner_id);
        self
    }

    /// Store a sanitized version of `name`
    pub fn set_filename(&mut self, name: Option<&str>) {
        self.filename = sanitize_filename(name);
    }

    /// Store the content type with surrounding whitespace removed
    pub fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.trim().to_string());
    }

    /// Check if the content type is one of `image_types`
    pub fn is_image(&self, image_types: &[String]) -> bool {
        self.content_type
            .as_deref()
            .map_or(false, |ct| image_types.iter().any(|t| t == ct))
    }

    /// Only root images spawn thumbnails; thumbnails are never thumbnailed.
    pub fn is_thumbnailable(&self, image_types: &[String]) -> bool {
        self.is_image(image_types) && self.parent_id.is_none()
    }

    pub fn is_thumbnail(&self) -> bool {
        self.parent_id.is_some()
    }

    /// `WxH`, suitable for an HTML size attribute
    pub fn image_size(&self) -> String {
        let show = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_default();
        format!("{}x{}", show(self.width), show(self.height))
    }

    /// Width and height, once both are known
    pub fn dimensions(&self) -> Option<ImageDimensions> {
        Some(ImageDimensions {
            width: self.width?,
            height: self.height?,
        })
    }

    /// Latest staged temp file
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_paths.first().map(StagedFile::path)
    }

    pub fn temp_paths(&self) -> &[StagedFile] {
        &self.temp_paths
    }

    /// Stage a file as the most recent data for this record
    pub fn stage(&mut self, file: StagedFile) {
        self.temp_paths.insert(0, file);
    }

    /// Release every staged file
    pub fn clear_temp_paths(&mut self) {
        self.temp_paths.clear();
    }

    /// True if staged data will be written to storage on the next commit
    pub fn save_attachment(&self) -> bool {
        self.temp_path().map_or(false, Path::is_file)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Image dimensions (for image attachments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn surface(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
