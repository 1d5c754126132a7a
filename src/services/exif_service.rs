use image::DynamicImage;
use std::io::{Cursor, Read};
use std::path::Path;

/// Camera metadata lives near the start of the file.
const EXIF_HEADER_LIMIT: u64 = 128 * 1024;

const UPRIGHT: u32 = 1;

/// EXIF orientation of the file at `path`, or 1 when there is none.
pub fn get_orientation(path: &Path) -> u32 {
    read_orientation(path).unwrap_or(UPRIGHT)
}

fn read_orientation(path: &Path) -> Option<u32> {
    let mut header = Vec::new();
    std::fs::File::open(path)
        .ok()?
        .take(EXIF_HEADER_LIMIT)
        .read_to_end(&mut header)
        .ok()?;

    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(&header))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

/// Turn a decoded image upright. Unknown values leave it untouched.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{GenericImageView, Rgb, RgbImage};

    /// Encode a `width`x`height` JPEG carrying an APP1 block whose only
    /// IFD0 entry is Orientation = `orientation`.
    pub(crate) fn write_oriented_jpeg(path: &Path, width: u32, height: u32, orientation: u16) {
        let mut jpeg = Vec::new();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 160, 220])));
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, 90)).unwrap();

        let mut tiff = vec![b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];
        tiff.extend_from_slice(&[0x00, 0x01]);
        tiff.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0x00, 0x00]);
        tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let mut app1 = b"Exif\0\0".to_vec();
        app1.extend_from_slice(&tiff);
        let length = (app1.len() + 2) as u16;

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&app1);
        out.extend_from_slice(&jpeg[2..]);
        std::fs::write(path, out).unwrap();
    }

    fn marked() -> DynamicImage {
        // 3x2, top-left pixel red.
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        for orientation in [5, 6, 7, 8] {
            assert_eq!(apply_orientation(marked(), orientation).dimensions(), (2, 3));
        }
        for orientation in [1, 2, 3, 4, 0, 42] {
            assert_eq!(apply_orientation(marked(), orientation).dimensions(), (3, 2));
        }
    }

    #[test]
    fn rotate_right_moves_top_left_to_top_right() {
        let rotated = apply_orientation(marked(), 6);
        assert_eq!(rotated.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn reads_orientation_tag() {
        let dir = tempfile::tempdir().unwrap();
        for orientation in [3u16, 6, 8] {
            let path = dir.path().join(format!("o{}.jpg", orientation));
            write_oriented_jpeg(&path, 40, 20, orientation);
            assert_eq!(get_orientation(&path), orientation as u32);
        }
    }

    #[test]
    fn files_without_exif_are_upright() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        marked().save(&path).unwrap();
        assert_eq!(get_orientation(&path), 1);
        assert_eq!(get_orientation(&dir.path().join("missing.jpg")), 1);
    }
}
