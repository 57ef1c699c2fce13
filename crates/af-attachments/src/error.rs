//! Attachment errors

use std::time::Duration;

use af_core::traits::Id;
use af_core::ValidationErrors;
use thiserror::Error;

use crate::processor::ProcessorError;
use crate::storage::StorageError;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("Thumbnail error: {0}")]
    Thumbnail(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Image processing error: {0}")]
    Processing(#[from] ProcessorError),
    #[error("Image processing timed out after {0:?}")]
    ProcessingTimeout(Duration),
    #[error("Record store error: {0}")]
    Store(String),
    #[error("Attachment not found: {0}")]
    NotFound(Id),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// How a failure should be treated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Field-level problems; nothing was written to storage
    Validation,
    /// Thumbnail requested for a record that cannot have one
    Thumbnail,
    /// Backend, processing or configuration failure
    Attachment,
}

impl AttachmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttachmentError::Validation(_) => ErrorKind::Validation,
            AttachmentError::Thumbnail(_) => ErrorKind::Thumbnail,
            _ => ErrorKind::Attachment,
        }
    }

    /// Field-level errors, if this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            AttachmentError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<af_core::ConfigError> for AttachmentError {
    fn from(err: af_core::ConfigError) -> Self {
        AttachmentError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for AttachmentError {
    fn from(err: serde_yaml::Error) -> Self {
        AttachmentError::Config(err.to_string())
    }
}
