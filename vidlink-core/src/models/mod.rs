pub mod download;
pub mod favorite;
pub mod media;
pub mod settings;
