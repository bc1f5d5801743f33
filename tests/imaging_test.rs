use std::fs;

use image::{Rgb, RgbImage};
use tempfile::TempDir;
use woundsight::{imaging, ImageError, ImagingLimits};

fn write_png(dir: &TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
    let path = dir.path().join(name);
    RgbImage::from_pixel(width, height, Rgb([150, 80, 60])).save(&path).unwrap();
    path
}

#[test]
fn test_valid_image_passes_every_rule() {
    let dir = TempDir::new().unwrap();
    let path = write_png(&dir, "ok.png", 128, 96);
    assert!(imaging::validate(&path, &ImagingLimits::default()).is_ok());
}

#[test]
fn test_zero_byte_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zero.jpg");
    fs::write(&path, []).unwrap();
    assert!(matches!(
        imaging::validate(&path, &ImagingLimits::default()),
        Err(ImageError::Empty(_))
    ));
}

#[test]
fn test_unsupported_extension_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("image.gif");
    fs::write(&path, b"GIF89a...").unwrap();
    assert!(matches!(
        imaging::validate(&path, &ImagingLimits::default()),
        Err(ImageError::UnsupportedFormat(ext)) if ext == "gif"
    ));
}

#[test]
fn test_below_minimum_dimensions_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_png(&dir, "small.png", 16, 64);
    assert!(matches!(
        imaging::validate(&path, &ImagingLimits::default()),
        Err(ImageError::TooSmall { width: 16, height: 64, min: 32 })
    ));
}

#[test]
fn test_exceeding_byte_budget_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_png(&dir, "large.png", 64, 64);
    let limits = ImagingLimits { max_file_bytes: 10, min_dimension: 32 };
    assert!(matches!(
        imaging::validate(&path, &limits),
        Err(ImageError::TooLarge { max: 10, .. })
    ));
}

#[test]
fn test_missing_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nope.png");
    assert!(matches!(
        imaging::validate(&path, &ImagingLimits::default()),
        Err(ImageError::NotFound(_))
    ));
    assert!(!imaging::is_valid(&path, &ImagingLimits::default()));
}

#[test]
fn test_image_info_reports_geometry() {
    let dir = TempDir::new().unwrap();
    let path = write_png(&dir, "geom.png", 200, 100);
    let info = imaging::image_info(&path, &ImagingLimits::default()).unwrap();
    assert_eq!(info.width, 200);
    assert_eq!(info.height, 100);
    assert!((info.aspect_ratio - 2.0).abs() < 1e-9);
    assert_eq!(info.format, "Png");
    assert!(!info.has_alpha);
    assert!(info.file_size_bytes > 0);
}
