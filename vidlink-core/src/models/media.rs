use serde::{Deserialize, Serialize};

use crate::platforms::Platform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Author {
    pub uid: String,
    pub name: String,
    #[serde(rename = "avatar")]
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_photo_url: Option<String>,
}

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            live_photo_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVariant {
    pub quality: String,
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Canonical description of one resolved post.
///
/// `video_url` is empty for gallery posts; `images` is empty for videos.
/// When present, `video_qualities` is non-empty and ordered best-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub video_url: String,
    pub cover_url: String,
    pub title: String,
    pub author: Author,
    pub images: Vec<ImageRef>,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_qualities: Option<Vec<QualityVariant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,
}

impl MediaDescriptor {
    pub fn has_video(&self) -> bool {
        !self.video_url.is_empty()
    }

    pub fn is_gallery(&self) -> bool {
        !self.images.is_empty()
    }

    /// Key used to recognise the same post across repeated resolutions.
    pub fn identity(&self) -> (Platform, &str, &str) {
        (self.platform, self.author.uid.as_str(), self.title.as_str())
    }
}
