use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;

use vidlink_core::platforms::Platform;

use crate::error::{ResolveError, Result};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[A-Za-z0-9\-._~:/?#\[\]@!$&'*+,;=%]+").unwrap()
});

/// Markers of an anti-bot interstitial, common to the ByteDance and
/// Kuaishou families of sites.
const CHALLENGE_MARKERS: &[&str] = &[
    "captcha",
    "verify-bar-close",
    "验证码",
    "middle_page_loading",
    "sec_verify",
];

/// First http(s) URL inside pasted share text, trailing punctuation removed.
pub fn extract_url(text: &str) -> Option<String> {
    let found = URL_RE.find(text)?.as_str();
    let trimmed = found.trim_end_matches(['.', ',', ';', '!', '?', '\'', ']', ')']);
    if trimmed.len() <= "https://".len() {
        return None;
    }
    Some(trimmed.to_string())
}

/// Locates `marker = { ... }` (or `[ ... ]`) in a page and returns the JSON
/// literal, matched by bracket depth so nested `</script>` strings and
/// trailing statements don't confuse it.
pub fn embedded_json<'a>(html: &'a str, marker: &str) -> Option<&'a str> {
    let start = html.find(marker)? + marker.len();
    let rest = html[start..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    balanced_json(rest)
}

/// Returns the leading object/array of `s`, or `None` if it is unbalanced.
pub fn balanced_json(s: &str) -> Option<&str> {
    let open = s.chars().next()?;
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn is_challenge_page(html: &str, extra_markers: &[&str]) -> bool {
    CHALLENGE_MARKERS
        .iter()
        .chain(extra_markers.iter())
        .any(|m| html.contains(m))
}

/// Error for a page whose embedded payload could not be found: a
/// verification page is a challenge, anything else is a layout change.
pub fn missing_payload(platform: Platform, html: &str, extra_markers: &[&str]) -> ResolveError {
    if is_challenge_page(html, extra_markers) {
        tracing::warn!("{}: challenge page served instead of content", platform);
        return ResolveError::challenge(platform);
    }
    let preview: String = html.chars().take(300).collect();
    tracing::debug!("{}: no embedded data, page preview: {}", platform, preview);
    ResolveError::schema(platform, "embedded data not found in page")
}

/// Status policy for API endpoints.
pub fn check_api_status(platform: Platform, status: StatusCode) -> Result<()> {
    match status.as_u16() {
        412 | 429 => {
            tracing::warn!("{}: API refused with HTTP {}", platform, status);
            Err(ResolveError::challenge(platform))
        }
        404 => Err(ResolveError::NotFound(format!("{} returned HTTP 404", platform))),
        _ if status.is_success() => Ok(()),
        _ => Err(ResolveError::schema(platform, format!("HTTP {}", status))),
    }
}

/// Parses a JSON API body, mapping garbage to `SchemaMismatch` for `platform`.
pub fn parse_json(platform: Platform, body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| ResolveError::schema(platform, format!("invalid JSON: {}", e)))
}

/// Non-empty string at a JSON pointer.
pub fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer)
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
}

/// String or number at a JSON pointer, rendered as a string.
pub fn string_at(v: &Value, pointer: &str) -> String {
    match v.pointer(pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Unsigned number at a JSON pointer; numeric strings are accepted.
pub fn u64_at(v: &Value, pointer: &str) -> Option<u64> {
    match v.pointer(pointer)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// First entry of a `url_list`-style array that is not a webp rendition,
/// falling back to the first entry.
pub fn first_non_webp(list: Option<&Value>) -> Option<String> {
    let urls: Vec<&str> = list?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    urls.iter()
        .find(|u| !u.contains(".webp"))
        .or_else(|| urls.first())
        .map(|u| u.to_string())
}
