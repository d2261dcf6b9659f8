//! Common validation utilities.

use validator::{ValidateUrl, ValidationError};

/// Maximum accepted length for any URL we store or redirect to.
pub const MAX_URL_LENGTH: usize = 2048;

/// Validates that a URL uses the http or https scheme.
///
/// Only the scheme is checked; pair it with `#[validate(url)]` on fields.
pub fn validate_http_scheme(value: &str) -> Result<(), ValidationError> {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        return Ok(());
    }

    let mut err = ValidationError::new("url_scheme");
    err.message = Some("URL must start with http:// or https://".into());
    Err(err)
}

/// Validates that a value is a well-formed absolute http(s) URL.
///
/// For values that are not struct fields, such as configuration entries.
pub fn validate_http_url(value: &str) -> Result<(), ValidationError> {
    validate_http_scheme(value)?;

    if value.len() > MAX_URL_LENGTH {
        let mut err = ValidationError::new("url_length");
        err.message = Some("URL must be at most 2048 characters".into());
        return Err(err);
    }

    if !value.validate_url() {
        let mut err = ValidationError::new("url");
        err.message = Some("URL is malformed".into());
        return Err(err);
    }

    Ok(())
}

/// Strips trailing slashes so paths can be appended with a single `/`.
pub fn normalize_base_url(value: &str) -> &str {
    value.trim_end_matches('/')
}
