use std::collections::HashSet;

use vidlink_core::models::media::{Author, ImageRef, MediaDescriptor, QualityVariant};

use crate::error::{ResolveError, Result};
use crate::models::raw::{RawMedia, RawQuality};

/// Builds the canonical descriptor from resolver output.
///
/// Unusable URLs are dropped, scheme-relative ones upgraded to https, and
/// quality variants ordered best-first with duplicate labels collapsed.
/// Feeding the same input twice gives equal output.
pub fn normalize(raw: RawMedia) -> Result<MediaDescriptor> {
    let platform = raw.platform;

    let qualities = rank_qualities(raw.qualities);
    let video_url = raw
        .video_url
        .as_deref()
        .and_then(clean_url)
        .or_else(|| qualities.first().map(|q| q.video_url.clone()))
        .unwrap_or_default();

    let images: Vec<ImageRef> = raw
        .images
        .into_iter()
        .filter_map(|img| {
            let url = clean_url(&img.url)?;
            Some(ImageRef {
                url,
                live_photo_url: img.live_photo_url.as_deref().and_then(clean_url),
            })
        })
        .collect();

    if video_url.is_empty() && images.is_empty() {
        tracing::debug!("[normalize] {} payload had neither video nor images", platform);
        return Err(ResolveError::schema(platform, "no video or images after mapping"));
    }

    let video_qualities = if video_url.is_empty() || qualities.is_empty() {
        None
    } else {
        Some(qualities)
    };

    Ok(MediaDescriptor {
        video_url,
        cover_url: clean_url(&raw.cover_url).unwrap_or_default(),
        title: collapse_whitespace(&raw.title),
        author: Author {
            uid: raw.author.uid.trim().to_string(),
            name: raw.author.name.trim().to_string(),
            avatar_url: clean_url(&raw.author.avatar_url).unwrap_or_default(),
        },
        images,
        platform,
        video_qualities,
        music_url: raw.music_url.as_deref().and_then(clean_url),
    })
}

/// Returns an absolute http(s) URL, or `None` if the input can't be one.
/// Scheme-relative input is taken as https.
pub fn clean_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        trimmed.to_string()
    };

    let parsed = url::Url::parse(&candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(candidate)
}

fn rank_qualities(raw: Vec<RawQuality>) -> Vec<QualityVariant> {
    let mut usable: Vec<(usize, RawQuality)> = raw
        .into_iter()
        .filter_map(|mut q| {
            q.url = clean_url(&q.url)?;
            Some(q)
        })
        .enumerate()
        .collect();

    usable.sort_by(|(ia, a), (ib, b)| {
        b.rank
            .cmp(&a.rank)
            .then_with(|| b.size.unwrap_or(0).cmp(&a.size.unwrap_or(0)))
            .then_with(|| ia.cmp(ib))
    });

    let mut seen_labels = HashSet::new();
    let mut seen_urls = HashSet::new();
    usable
        .into_iter()
        .filter_map(|(_, q)| {
            let label = if q.label.trim().is_empty() {
                format!("{}", q.rank)
            } else {
                q.label.trim().to_string()
            };
            if !seen_labels.insert(label.clone()) || !seen_urls.insert(q.url.clone()) {
                return None;
            }
            Some(QualityVariant {
                quality: label,
                video_url: q.url,
                size: q.size,
            })
        })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
