pub mod fs_types;
pub mod principal;
