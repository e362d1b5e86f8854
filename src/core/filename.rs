use std::sync::LazyLock;

use regex::Regex;
use vidlink_core::models::media::MediaDescriptor;

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#[^\s#]+(\[话题\])?#?").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const MAX_STEM_CHARS: usize = 80;
const KNOWN_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "flv", "webm", "m4a", "mp3", "jpg", "jpeg", "png", "webp", "gif",
];

/// Title with hashtags dropped, whitespace collapsed and path-hostile
/// characters removed, cut to a length every filesystem accepts.
pub fn sanitize_title(title: &str) -> String {
    let without_tags = HASHTAG_RE.replace_all(title, " ");
    let collapsed = WS_RE.replace_all(without_tags.trim(), " ");
    let clean = sanitize_filename::sanitize(collapsed.as_ref());
    let cut: String = clean.chars().take(MAX_STEM_CHARS).collect();
    cut.trim_end_matches([' ', '-', '.', '_']).trim().to_string()
}

/// `{platform}_{title}.{ext}`, falling back to the author uid when the title
/// has nothing usable left.
pub fn file_name_for(descriptor: &MediaDescriptor, ext: &str) -> String {
    let mut stem = sanitize_title(&descriptor.title);
    if stem.is_empty() {
        stem = sanitize_title(&descriptor.author.uid);
    }
    if stem.is_empty() {
        stem = "video".to_string();
    }
    format!("{}_{}.{}", descriptor.platform, stem, ext)
}

/// Extension from the last path segment of `url`, or `fallback`.
pub fn extension_from_url(url: &str, fallback: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            let last = u.path_segments()?.next_back()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            let ext = ext.to_ascii_lowercase();
            KNOWN_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
        })
        .unwrap_or_else(|| fallback.to_string())
}
