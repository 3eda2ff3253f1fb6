//! Input validation helpers for registration and gate requests.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length for person names
pub const MAX_NAME_LENGTH: usize = 512;

/// Maximum length for email addresses
pub const MAX_EMAIL_LENGTH: usize = 320;

/// Maximum length for external ids (badge / id numbers)
pub const MAX_EXTERNAL_ID_LENGTH: usize = 64;

/// Maximum length for a normalized plate
pub const MAX_PLATE_LENGTH: usize = 16;

/// Get current Unix timestamp in seconds, safely handling clock errors.
pub fn safe_unix_timestamp() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "System clock is before UNIX epoch (1970-01-01), using timestamp 0"
            );
            0
        }
    }
}

/// Get current Unix timestamp in milliseconds, safely handling clock errors.
pub fn safe_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Normalize raw plate text for registry comparison: strip all whitespace
/// and case-fold to upper case.
pub fn normalize_plate(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<String>()
        .to_uppercase()
}

/// Validate an already-normalized plate: non-empty, bounded length, and
/// restricted to the plate character set.
pub fn validate_plate(plate: &str) -> Result<()> {
    if plate.is_empty() {
        return Err(anyhow!("plate must not be empty"));
    }
    if plate.len() > MAX_PLATE_LENGTH {
        return Err(anyhow!(
            "plate exceeds maximum length of {} characters",
            MAX_PLATE_LENGTH
        ));
    }

    let pattern = Regex::new(r"^[A-Z0-9-]+$").map_err(|e| anyhow!("invalid plate pattern: {}", e))?;
    if !pattern.is_match(plate) {
        return Err(anyhow!("plate contains invalid characters: {}", plate));
    }

    Ok(())
}

/// Validate a person name for registration.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("name must not be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(anyhow!(
            "name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        ));
    }
    Ok(())
}

/// Validate an external id for registration.
pub fn validate_external_id(external_id: &str) -> Result<()> {
    if external_id.trim().is_empty() {
        return Err(anyhow!("external id must not be empty"));
    }
    if external_id.len() > MAX_EXTERNAL_ID_LENGTH {
        return Err(anyhow!(
            "external id exceeds maximum length of {} characters",
            MAX_EXTERNAL_ID_LENGTH
        ));
    }
    Ok(())
}

/// Validate an email address (length plus a basic shape check).
pub fn validate_email(email: &str) -> Result<()> {
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(anyhow!(
            "email exceeds maximum length of {} characters",
            MAX_EMAIL_LENGTH
        ));
    }

    let pattern =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_err(|e| anyhow!("invalid email pattern: {}", e))?;
    if !pattern.is_match(email) {
        return Err(anyhow!("invalid email address: {}", email));
    }

    Ok(())
}
