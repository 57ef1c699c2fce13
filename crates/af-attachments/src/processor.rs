//! Image processors
//!
//! Decoding, resizing and encoding are blocking; the pipeline calls these
//! from a blocking thread.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

use af_core::ProcessorKind;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use thiserror::Error;
use tracing::debug;

use crate::geometry::ResizePlan;

/// Processor errors
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Cannot open image {path}: {message}")]
    Open { path: String, message: String },
    #[error("Unrecognized image format: {0}")]
    UnknownFormat(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Invalid resize geometry: {0}")]
    Geometry(#[from] crate::geometry::GeometryError),
    #[error("Processing task failed: {0}")]
    Task(String),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// A decoded image plus the format it was read from
#[derive(Debug, Clone)]
pub struct ImageHandle {
    image: DynamicImage,
    format: ImageFormat,
}

impl ImageHandle {
    pub fn new(image: DynamicImage, format: ImageFormat) -> Self {
        Self { image, format }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

/// Image library adapter used by the pipeline
pub trait ImageProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Decode the image stored at `path`
    fn open(&self, path: &Path) -> ProcessorResult<ImageHandle> {
        let display = path.display().to_string();
        let open_err = |message: String| ProcessorError::Open {
            path: display.clone(),
            message,
        };

        let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        let reader = ImageReader::new(BufReader::new(file))
            .with_guessed_format()
            .map_err(|e| open_err(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| ProcessorError::UnknownFormat(display.clone()))?;
        let image = reader.decode().map_err(|e| open_err(e.to_string()))?;

        Ok(ImageHandle::new(image, format))
    }

    fn dimensions(&self, handle: &ImageHandle) -> (u32, u32) {
        handle.image.dimensions()
    }

    fn resize(&self, handle: ImageHandle, plan: &ResizePlan) -> ImageHandle;

    /// Encode with the given JPEG quality (ignored by other formats)
    fn encode(&self, handle: &ImageHandle, quality: Option<u8>) -> ProcessorResult<Bytes>;

    /// Extension (with leading dot) used for thumbnails of a file with `ext`
    fn thumbnail_extension(&self, ext: &str) -> String {
        ext.to_string()
    }
}

fn encode_as(image: &DynamicImage, format: ImageFormat, quality: Option<u8>) -> ProcessorResult<Bytes> {
    let mut buffer = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            let encoder = match quality {
                Some(q) => JpegEncoder::new_with_quality(&mut buffer, q),
                None => JpegEncoder::new(&mut buffer),
            };
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| ProcessorError::Encode(e.to_string()))?;
        }
        other => {
            let mut cursor = Cursor::new(&mut buffer);
            image
                .write_to(&mut cursor, other)
                .map_err(|e| ProcessorError::Encode(e.to_string()))?;
        }
    }

    Ok(Bytes::from(buffer))
}

/// High quality resampling that keeps the source format
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterProcessor;

impl ImageProcessor for RasterProcessor {
    fn name(&self) -> &str {
        "raster"
    }

    fn resize(&self, handle: ImageHandle, plan: &ResizePlan) -> ImageHandle {
        let image = if plan.crop {
            handle
                .image
                .resize_to_fill(plan.width, plan.height, FilterType::Lanczos3)
        } else {
            handle
                .image
                .resize_exact(plan.width, plan.height, FilterType::Lanczos3)
        };
        debug!(width = plan.width, height = plan.height, crop = plan.crop, "Resized image");
        ImageHandle::new(image, handle.format)
    }

    fn encode(&self, handle: &ImageHandle, quality: Option<u8>) -> ProcessorResult<Bytes> {
        encode_as(&handle.image, handle.format, quality)
    }
}

/// Fast sampling resize. Does not write GIF, so GIF sources come out as PNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SamplingProcessor;

impl SamplingProcessor {
    fn output_format(format: ImageFormat) -> ImageFormat {
        match format {
            ImageFormat::Gif => ImageFormat::Png,
            other => other,
        }
    }
}

impl ImageProcessor for SamplingProcessor {
    fn name(&self) -> &str {
        "sampling"
    }

    fn resize(&self, handle: ImageHandle, plan: &ResizePlan) -> ImageHandle {
        let image = if plan.crop {
            handle
                .image
                .resize_to_fill(plan.width, plan.height, FilterType::Nearest)
        } else {
            handle.image.thumbnail_exact(plan.width, plan.height)
        };
        ImageHandle::new(image, Self::output_format(handle.format))
    }

    fn encode(&self, handle: &ImageHandle, quality: Option<u8>) -> ProcessorResult<Bytes> {
        encode_as(&handle.image, Self::output_format(handle.format), quality)
    }

    fn thumbnail_extension(&self, ext: &str) -> String {
        if ext.eq_ignore_ascii_case(".gif") {
            ".png".to_string()
        } else {
            ext.to_string()
        }
    }
}

/// Create the configured processor; `None` disables image processing
pub fn create_processor(kind: ProcessorKind) -> Option<Arc<dyn ImageProcessor>> {
    match kind {
        ProcessorKind::Raster => Some(Arc::new(RasterProcessor)),
        ProcessorKind::Sampling => Some(Arc::new(SamplingProcessor)),
        ProcessorKind::None => None,
    }
}
