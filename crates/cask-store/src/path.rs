//! Storage path validation and joining.
//!
//! Valid storage paths:
//! - Must be non-empty
//! - Must not start or end with `/`
//! - Must not contain `\`, NUL, or consecutive slashes
//! - Must not contain `.` or `..` components

use crate::error::{StoreError, StoreResult};

/// Validate a relative storage path, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use cask_store::validate_path;
///
/// assert!(validate_path("refs/by-id/01/92/x.json").is_ok());
/// assert!(validate_path("/etc/passwd").is_err());
/// assert!(validate_path("data/../secret").is_err());
/// ```
pub fn validate_path(path: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    if path.contains('\\') || path.contains('\0') {
        return Err(invalid("contains a backslash or NUL"));
    }
    for component in path.split('/') {
        match component {
            "" => return Err(invalid("path components must not be empty")),
            "." | ".." => return Err(invalid("must not contain '.' or '..' components")),
            _ => {}
        }
    }
    Ok(())
}

/// Join path segments with `/`, skipping empty segments.
pub fn join_path<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for segment in segments {
        let segment = segment.as_ref().trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}
