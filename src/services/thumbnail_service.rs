use crate::error::GalleryError;
use crate::models::fs_types::MediaKind;
use crate::services::{exif_service, video_service};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

pub const THUMBNAIL_SIZE: u32 = 300;
const THUMBNAIL_QUALITY: u8 = 85;

/// Generate a thumbnail and return the raw JPEG bytes.
///
/// Images are turned upright per their EXIF orientation before resizing;
/// videos use their first frame. The result never exceeds
/// `THUMBNAIL_SIZE` in either dimension and carries no alpha.
pub fn generate_thumbnail_bytes(
    path: &Path,
    kind: MediaKind,
    ffmpeg: &Path,
) -> Result<Vec<u8>, GalleryError> {
    if !path.exists() {
        return Err(GalleryError::NotFound);
    }
    let start = Instant::now();

    let img = match kind {
        MediaKind::Image => {
            let orientation = exif_service::get_orientation(path);
            let img = decode_image_dynamic(path)?;
            exif_service::apply_orientation(img, orientation)
        }
        MediaKind::Video => video_service::first_frame(path, ffmpeg)?,
    };

    let thumb = fit_within(img, THUMBNAIL_SIZE);
    let bytes = encode_jpeg_thumbnail(thumb)?;

    tracing::debug!(
        path = %path.display(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "thumbnail generated"
    );
    Ok(bytes)
}

/// Downscale so neither side exceeds `max`, keeping the aspect ratio.
/// Smaller images are left alone.
fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        img
    } else {
        img.resize(max, max, FilterType::Lanczos3)
    }
}

/// Flatten to opaque RGB and encode as JPEG.
fn encode_jpeg_thumbnail(img: DynamicImage) -> Result<Vec<u8>, GalleryError> {
    let rgb = DynamicImage::ImageRgb8(img.into_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, THUMBNAIL_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| GalleryError::Generation(format!("Failed to encode thumbnail: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Full decode of the image file.
fn decode_image_dynamic(path: &Path) -> Result<DynamicImage, GalleryError> {
    ImageReader::open(path)
        .map_err(|e| GalleryError::Generation(format!("Failed to open image {}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| GalleryError::Generation(format!("Failed to read image {}: {}", path.display(), e)))?
        .decode()
        .map_err(|e| GalleryError::Generation(format!("Failed to decode image {}: {}", path.display(), e)))
}
