use vidlink_core::models::media::{Author, ImageRef};
use vidlink_core::platforms::Platform;

/// One encoded rendition as found in a platform payload, before ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuality {
    pub label: String,
    pub url: String,
    /// Higher is better. Height in pixels or bitrate, whichever the platform gives.
    pub rank: u64,
    pub size: Option<u64>,
}

impl RawQuality {
    pub fn new(label: impl Into<String>, url: impl Into<String>, rank: u64) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            rank,
            size: None,
        }
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size.filter(|s| *s > 0);
        self
    }
}

/// What a resolver pulled out of a platform response. URLs may still be
/// scheme-relative, empty or otherwise unusable; the normalizer cleans up.
#[derive(Debug, Clone)]
pub struct RawMedia {
    pub platform: Platform,
    /// Preferred playback URL, if the resolver already picked one.
    pub video_url: Option<String>,
    pub qualities: Vec<RawQuality>,
    pub images: Vec<ImageRef>,
    pub cover_url: String,
    pub title: String,
    pub author: Author,
    pub music_url: Option<String>,
}

impl RawMedia {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            video_url: None,
            qualities: Vec::new(),
            images: Vec::new(),
            cover_url: String::new(),
            title: String::new(),
            author: Author::default(),
            music_url: None,
        }
    }
}
