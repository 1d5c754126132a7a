use crate::error::GalleryError;
use crate::services::layout::StorageLayout;
use crate::services::media;
use chrono::{DateTime, Datelike, Local, Timelike};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip every media file below `folder`, entries named by their path relative
/// to `folder` with `/` separators.
///
/// The walk is sorted, so an unchanged folder always yields the same bytes.
/// Symlinks are followed only while they resolve inside `root` or a linked
/// root; files that disappear mid-walk are skipped.
pub fn build_archive(
    folder: &Path,
    root: &Path,
    layout: &StorageLayout,
) -> Result<Vec<u8>, GalleryError> {
    match std::fs::metadata(folder) {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(GalleryError::NotFound),
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut added = 0usize;

    let walker = WalkDir::new(folder)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| stays_inside(entry, root, layout));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !media::is_media(&name) {
            continue;
        }

        let relative = match entry_name(folder, entry.path()) {
            Some(r) => r,
            None => continue,
        };
        let mut file = match File::open(entry.path()) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        let meta = file.metadata()?;

        let mut file_options = options.large_file(meta.len() >= u32::MAX as u64);
        if let Some(stamp) = meta.modified().ok().and_then(zip_timestamp) {
            file_options = file_options.last_modified_time(stamp);
        }

        zip.start_file(relative.as_str(), file_options)?;
        std::io::copy(&mut file, &mut zip)?;
        added += 1;
    }

    let cursor = zip.finish()?;
    tracing::debug!(folder = %folder.display(), files = added, "archive built");
    Ok(cursor.into_inner())
}

fn stays_inside(entry: &DirEntry, root: &Path, layout: &StorageLayout) -> bool {
    if entry.depth() > 0 && !entry.path_is_symlink() {
        return true;
    }
    entry
        .path()
        .canonicalize()
        .map(|real| layout.within(root, &real))
        .unwrap_or(false)
}

fn entry_name(folder: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(folder).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn zip_timestamp(modified: SystemTime) -> Option<zip::DateTime> {
    let local = DateTime::<Local>::from(modified);
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use std::io::Read;

    fn setup() -> (tempfile::TempDir, StorageLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout =
            StorageLayout::new(&dir.path().join("PUBLIC"), &dir.path().join("PRIVATE"), "PRIVATE", &[]).unwrap();
        (dir, layout)
    }

    fn write(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn names(bytes: Vec<u8>) -> BTreeSet<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn keeps_only_media_with_relative_names() {
        let (_dir, layout) = setup();
        let section = layout.public_root().join("Section");
        write(&section.join("a.jpg"), b"jpeg bytes");
        write(&section.join("b.txt"), b"text");
        write(&section.join("sub/c.png"), b"png bytes");

        let bytes = build_archive(&section, layout.public_root(), &layout).unwrap();
        let expected: BTreeSet<String> = ["a.jpg", "sub/c.png"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names(bytes.clone()), expected);

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name("sub/c.png").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"png bytes");
    }

    #[test]
    fn not_a_directory() {
        let (_dir, layout) = setup();
        let file = layout.public_root().join("single.jpg");
        write(&file, b"x");
        assert!(matches!(
            build_archive(&file, layout.public_root(), &layout),
            Err(GalleryError::NotFound)
        ));
        assert!(matches!(
            build_archive(&layout.public_root().join("missing"), layout.public_root(), &layout),
            Err(GalleryError::NotFound)
        ));
    }

    #[test]
    fn deterministic_output() {
        let (_dir, layout) = setup();
        let section = layout.public_root().join("S");
        write(&section.join("z.gif"), b"1");
        write(&section.join("m/a.webm"), b"2");
        write(&section.join("A.JPG"), b"3");

        let first = build_archive(&section, layout.public_root(), &layout).unwrap();
        let second = build_archive(&section, layout.public_root(), &layout).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_folder_gives_empty_archive() {
        let (_dir, layout) = setup();
        let section = layout.public_root().join("Empty");
        write(&section.join("readme.md"), b"nothing to see");
        let bytes = build_archive(&section, layout.public_root(), &layout).unwrap();
        assert!(names(bytes).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn does_not_follow_links_out_of_root() {
        let (dir, layout) = setup();
        let section = layout.public_root().join("S");
        write(&section.join("in.jpg"), b"in");
        write(&dir.path().join("outside/out.jpg"), b"out");
        std::os::unix::fs::symlink(dir.path().join("outside"), section.join("escape")).unwrap();
        std::os::unix::fs::symlink(layout.public_root(), section.join("loop")).unwrap();

        let bytes = build_archive(&section, layout.public_root(), &layout).unwrap();
        let found = names(bytes);
        assert!(found.contains("in.jpg"));
        assert!(!found.iter().any(|n| n.starts_with("escape/")));
    }
}
