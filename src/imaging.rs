//! Image validation and loading for the classification pipeline.

use std::fs;
use std::path::Path;

use image::{DynamicImage, ImageReader, RgbImage};
use log::error;
use serde::Serialize;
use thiserror::Error;

use crate::config::ImagingLimits;

/// File extensions accepted as image input.
const SUPPORTED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff", "tif"];

/// Why an input image was rejected. Each rule fails independently.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image file not found: {0}")]
    NotFound(String),

    #[error("image file is empty: {0}")]
    Empty(String),

    #[error("image file too large: {actual} bytes (max: {max} bytes)")]
    TooLarge { actual: u64, max: u64 },

    #[error("unsupported image format: {0:?}")]
    UnsupportedFormat(String),

    #[error("failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("image too small: {width}x{height} (min: {min}x{min})")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata extracted from an image file without fully decoding it into the
/// model input format.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub format: String,
    pub color_mode: String,
    pub width: u32,
    pub height: u32,
    pub file_size_bytes: u64,
    pub aspect_ratio: f64,
    pub has_alpha: bool,
}

/// Validates an image file against the configured limits.
///
/// Checks, in order: existence, non-zero size, maximum size, supported
/// extension, decodability, minimum pixel dimensions. The first failing rule
/// is returned; passing all of them means the file can be handed to
/// [`load_rgb`].
pub fn validate(path: &Path, limits: &ImagingLimits) -> Result<(), ImageError> {
    if !path.exists() {
        return Err(ImageError::NotFound(path.display().to_string()));
    }

    let file_size = fs::metadata(path)?.len();
    if file_size == 0 {
        return Err(ImageError::Empty(path.display().to_string()));
    }
    if file_size > limits.max_file_bytes {
        return Err(ImageError::TooLarge { actual: file_size, max: limits.max_file_bytes });
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ImageError::UnsupportedFormat(extension));
    }

    let img = decode(path)?;
    if img.width() < limits.min_dimension || img.height() < limits.min_dimension {
        return Err(ImageError::TooSmall {
            width: img.width(),
            height: img.height(),
            min: limits.min_dimension,
        });
    }

    Ok(())
}

/// Boolean convenience over [`validate`], logging the rejection reason.
pub fn is_valid(path: &Path, limits: &ImagingLimits) -> bool {
    match validate(path, limits) {
        Ok(()) => true,
        Err(e) => {
            error!("Image validation failed for {}: {}", path.display(), e);
            false
        }
    }
}

/// Extracts metadata from an image file.
pub fn image_info(path: &Path, limits: &ImagingLimits) -> Result<ImageInfo, ImageError> {
    validate(path, limits)?;

    let file_size = fs::metadata(path)?.len();
    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    let format = reader
        .format()
        .map(|f| format!("{:?}", f))
        .unwrap_or_else(|| "Unknown".to_string());
    let img = reader.decode().map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    Ok(ImageInfo {
        format,
        color_mode: format!("{:?}", img.color()),
        width: img.width(),
        height: img.height(),
        file_size_bytes: file_size,
        aspect_ratio: img.width() as f64 / img.height() as f64,
        has_alpha: img.color().has_alpha(),
    })
}

/// Loads an image and converts it to 3-channel RGB for preprocessing.
pub fn load_rgb(path: &Path) -> Result<RgbImage, ImageError> {
    Ok(decode(path)?.to_rgb8())
}

fn decode(path: &Path) -> Result<DynamicImage, ImageError> {
    ImageReader::open(path)?
        .with_guessed_format()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?
        .decode()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))
}
