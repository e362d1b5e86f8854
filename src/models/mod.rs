pub use vidlink_core::models::{download, favorite, media, settings};

pub mod raw;
