//! Per-type attachment options and acceptance rules
//!
//! ```yaml
//! content_type: [image, application/pdf]
//! max_size: 5242880
//! resize_to: "1024x1024>"
//! thumbnails:
//!   thumb: [50, 50]
//! jpeg_quality:
//!   "<2000": 90
//!   ">=2000": 75
//! ```

use af_core::{ValidationErrors, BLANK, NOT_INCLUDED};
use serde::{Deserialize, Serialize};

use crate::error::AttachmentResult;
use crate::geometry::ResizeSpec;
use crate::model::AttachmentRecord;
use crate::quality::JpegQuality;
use crate::thumbnails::ThumbnailConfig;

/// Token in `content_type` that stands for every recognized image type
pub const IMAGE_TOKEN: &str = "image";

/// Options for one attachment-bearing type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentOptions {
    /// Allowed content types; `None` accepts everything
    pub content_type: Option<Vec<String>>,
    /// Minimum size in bytes
    pub min_size: u64,
    /// Maximum size in bytes
    pub max_size: u64,
    /// Resize applied to original images
    pub resize_to: Option<ResizeSpec>,
    /// Thumbnails generated for original images
    pub thumbnails: ThumbnailConfig,
    /// JPEG quality used when re-encoding
    pub jpeg_quality: Option<JpegQuality>,
    /// Cache-Control override for object-store writes; `None` keeps the backend default
    pub cache_control: Option<String>,
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            min_size: 1,
            max_size: 1024 * 1024, // 1 MB
            resize_to: None,
            thumbnails: ThumbnailConfig::new(),
            jpeg_quality: None,
            cache_control: None,
        }
    }
}

impl AttachmentOptions {
    pub fn from_yaml_str(yaml: &str) -> AttachmentResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Allowed content types with the `image` token expanded
    pub fn accepted_content_types(&self, image_types: &[String]) -> Option<Vec<String>> {
        let configured = self.content_type.as_ref()?;
        let mut accepted = Vec::with_capacity(configured.len());
        for entry in configured {
            if entry == IMAGE_TOKEN {
                accepted.extend(image_types.iter().cloned());
            } else {
                accepted.push(entry.clone());
            }
        }
        Some(accepted)
    }

    /// Check presence of size/content type/filename and that size and
    /// content type fall inside the configured bounds.
    pub fn validate(&self, record: &AttachmentRecord, image_types: &[String]) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        match record.size {
            None => errors.add("size", BLANK),
            Some(size) if size < self.min_size || size > self.max_size => {
                errors.add("size", NOT_INCLUDED)
            }
            Some(_) => {}
        }

        match record.content_type.as_deref() {
            None | Some("") => errors.add("content_type", BLANK),
            Some(ct) => {
                if let Some(accepted) = self.accepted_content_types(image_types) {
                    if !accepted.iter().any(|t| t == ct) {
                        errors.add("content_type", NOT_INCLUDED);
                    }
                }
            }
        }

        if record.filename.as_deref().map_or(true, str::is_empty) {
            errors.add("filename", BLANK);
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_types() -> Vec<String> {
        vec!["image/png".to_string(), "image/gif".to_string()]
    }

    fn record(filename: &str, content_type: &str, size: u64) -> AttachmentRecord {
        let mut record = AttachmentRecord::new();
        record.set_filename(Some(filename));
        record.set_content_type(content_type);
        record.size = Some(size);
        record
    }

    #[test]
    fn test_defaults() {
        let options = AttachmentOptions::default();
        assert_eq!(options.min_size, 1);
        assert_eq!(options.max_size, 1024 * 1024);
        assert_eq!(options.cache_control, None);
        assert!(options.thumbnails.is_empty());
        assert!(options.validate(&record("a.bin", "application/x-anything", 10), &image_types()).is_empty());
    }

    #[test]
    fn test_image_token_expands() {
        let options = AttachmentOptions {
            content_type: Some(vec!["image".to_string(), "application/pdf".to_string()]),
            ..Default::default()
        };
        assert_eq!(
            options.accepted_content_types(&image_types()),
            Some(vec![
                "image/png".to_string(),
                "image/gif".to_string(),
                "application/pdf".to_string()
            ])
        );
        assert!(options.validate(&record("a.png", "image/png", 10), &image_types()).is_empty());

        let errors = options.validate(&record("a.txt", "text/plain", 10), &image_types());
        assert_eq!(errors.get("content_type"), Some(&vec![NOT_INCLUDED.to_string()]));
    }

    #[test]
    fn test_size_bounds() {
        let options = AttachmentOptions {
            min_size: 10,
            max_size: 20,
            ..Default::default()
        };
        assert!(options.validate(&record("a.txt", "text/plain", 10), &[]).is_empty());
        assert!(options.validate(&record("a.txt", "text/plain", 20), &[]).is_empty());
        assert!(options.validate(&record("a.txt", "text/plain", 9), &[]).has_error("size"));
        assert!(options.validate(&record("a.txt", "text/plain", 21), &[]).has_error("size"));
    }

    #[test]
    fn test_presence() {
        let errors = AttachmentOptions::default().validate(&AttachmentRecord::new(), &[]);
        assert!(errors.has_error("size"));
        assert!(errors.has_error("content_type"));
        assert!(errors.has_error("filename"));
    }

    #[test]
    fn test_from_yaml() {
        let options = AttachmentOptions::from_yaml_str(
            r#"
content_type: [image]
max_size: 2048
resize_to: "640x480>"
thumbnails:
  thumb: [50, 50]
  small: "100"
jpeg_quality: 80
"#,
        )
        .unwrap();

        assert_eq!(options.max_size, 2048);
        assert_eq!(options.min_size, 1);
        assert_eq!(options.resize_to, Some(ResizeSpec::Geometry("640x480>".to_string())));
        assert_eq!(options.thumbnails.len(), 2);
        assert_eq!(options.jpeg_quality, Some(JpegQuality::Flat(80)));

        assert!(AttachmentOptions::from_yaml_str("thumbnails: 12").is_err());
    }
}
