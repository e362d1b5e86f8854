use crate::error::{ResolveError, Result};

/// Reads the `Location` of a single hop. `client` must not follow redirects.
///
/// Returns `Ok(None)` when the response is not a redirect.
pub async fn resolve_redirect(
    client: &reqwest::Client,
    url: &str,
    user_agent: &str,
) -> Result<Option<String>> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, user_agent)
        .send()
        .await?;

    if !response.status().is_redirection() {
        return Ok(None);
    }

    let Some(location) = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };

    Ok(Some(absolutize(url, location)?))
}

/// Follows redirects by hand, at most `max_hops` times, passing each new
/// location through `rewrite` before it is requested.
pub async fn follow_redirects<F>(
    client: &reqwest::Client,
    url: &str,
    user_agent: &str,
    max_hops: usize,
    rewrite: F,
) -> Result<String>
where
    F: Fn(String) -> String,
{
    let mut current = url.to_string();
    for hop in 0..max_hops {
        match resolve_redirect(client, &current, user_agent).await? {
            Some(next) => {
                let next = rewrite(next);
                tracing::debug!("[redirect] hop {}: {} -> {}", hop + 1, current, next);
                current = next;
            }
            None => return Ok(current),
        }
    }
    tracing::debug!("[redirect] stopped after {} hops at {}", max_hops, current);
    Ok(current)
}

fn absolutize(base: &str, location: &str) -> Result<String> {
    if let Ok(abs) = url::Url::parse(location) {
        return Ok(abs.to_string());
    }
    let base = url::Url::parse(base)
        .map_err(|e| ResolveError::Network(format!("invalid redirect base {}: {}", base, e)))?;
    base.join(location)
        .map(|u| u.to_string())
        .map_err(|e| ResolveError::Network(format!("invalid redirect location {}: {}", location, e)))
}
