//! Upload naming and admission rules (pure functions).

use std::collections::HashSet;
use std::path::Path;

use crate::error::CoreError;

/// Accepted image extensions, lowercase, without the dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Name used when a part carries no usable file name.
const FALLBACK_FILE_NAME: &str = "image.jpg";

/// Per-submission upload limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_bytes: u64,
}

impl UploadLimits {
    /// Reject a submission that already holds `count` files.
    pub fn check_file_count(&self, count: usize) -> Result<(), CoreError> {
        if count > self.max_files {
            return Err(CoreError::Validation(format!(
                "Too many files: at most {} per request",
                self.max_files
            )));
        }
        Ok(())
    }

    /// Reject a file once `written` bytes exceed the per-file limit.
    pub fn check_file_size(&self, name: &str, written: u64) -> Result<(), CoreError> {
        if written > self.max_file_bytes {
            return Err(CoreError::Validation(format!(
                "File {name} exceeds the {} byte limit",
                self.max_file_bytes
            )));
        }
        Ok(())
    }
}

/// Reduce a client-supplied name to its final path component.
///
/// Both `/` and `\` separate components so Windows paths are handled on
/// every platform. Empty results and dot-only names fall back to
/// `image.jpg`.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(char::from(0));
    if base.is_empty() || base.chars().all(|c| c == '.') {
        FALLBACK_FILE_NAME.to_string()
    } else {
        base.to_string()
    }
}

/// Whether `name` has one of the [`ALLOWED_EXTENSIONS`] (case-insensitive).
pub fn is_allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Validate a sanitized name's extension.
pub fn check_extension(name: &str) -> Result<(), CoreError> {
    if is_allowed_extension(name) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported file type: {name} (allowed: .jpg, .jpeg, .png)"
        )))
    }
}

/// Pick a name not yet in `used`, suffixing `_1`, `_2`, ... onto the stem.
/// The chosen name is recorded in `used`. Comparison is case-insensitive so
/// names stay distinct on case-insensitive filesystems.
pub fn unique_file_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_lowercase()) {
        return name.to_string();
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());

    let mut n = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        if used.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}
