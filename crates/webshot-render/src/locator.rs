//! Locator normalization and validation

use crate::error::{RenderError, Result};
use url::Url;

/// Validate a locator that already carries its scheme.
///
/// Only `http` and `https` URLs with a host are accepted.
pub fn validate_locator(locator: &str) -> Result<Url> {
    let url = Url::parse(locator)
        .map_err(|e| RenderError::Validation(format!("Invalid URL provided: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(RenderError::Validation(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(RenderError::Validation("URL must include a host".to_string()));
    }

    Ok(url)
}

/// Normalize raw user input into a validated URL.
///
/// Surrounding whitespace is trimmed and `http://` is prefixed when no
/// scheme is present. Explicit non-http schemes are rejected rather than
/// prefixed.
pub fn normalize_locator(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RenderError::Validation(
            "Missing required parameter: url".to_string(),
        ));
    }

    if has_http_scheme(trimmed) || has_explicit_scheme(trimmed) {
        validate_locator(trimmed)
    } else {
        validate_locator(&format!("http://{}", trimmed))
    }
}

// `scheme://` at the very start, as in `ftp://host`
fn has_explicit_scheme(locator: &str) -> bool {
    locator.split_once("://").is_some_and(|(scheme, _)| {
        scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn has_http_scheme(locator: &str) -> bool {
    let lower = locator
        .get(..8)
        .unwrap_or(locator)
        .to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
