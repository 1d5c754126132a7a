pub mod access;
pub mod archive_service;
pub mod db;
pub mod exif_service;
pub mod fs_service;
pub mod layout;
pub mod media;
pub mod thumbnail_service;
pub mod video_service;
