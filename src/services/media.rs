use crate::models::fs_types::MediaKind;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Classify a file name by extension. `None` means not media.
pub fn classify(name: &str) -> Option<MediaKind> {
    let ext = extension(name)?;
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

pub fn is_media(name: &str) -> bool {
    classify(name).is_some()
}

pub fn is_video(name: &str) -> bool {
    classify(name) == Some(MediaKind::Video)
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
