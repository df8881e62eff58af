//! Shared relative-path normalization.
//!
//! Coverage artifacts, git output, and caller-supplied changed-file lists all
//! spell paths slightly differently. Both the artifact parser and the
//! changed-path resolver funnel through [`normalize_relative_path`] so the
//! exact-match-before-suffix-match precedence behaves identically everywhere.

use std::path::Path;

/// Normalize a relative path: trim surrounding whitespace, convert
/// backslashes to forward slashes, and strip any leading slashes. Returns an
/// empty string for blank input; callers drop empties.
pub fn normalize_relative_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let forward = trimmed.replace('\\', "/");
    forward.trim_start_matches('/').to_string()
}

/// Whether `path` carries one of the configured source-relevant extensions.
/// Extensions may be configured with or without the leading dot.
pub fn has_source_extension(path: &str, extensions: &[String]) -> bool {
    let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    extensions
        .iter()
        .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}
