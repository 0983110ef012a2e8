//! Pure path-mapping logic: public `/uploads/<name>` to the upload directory.

use std::path::{Path, PathBuf};

/// Given a request path, return the committed file it names under
/// `upload_dir`, or `None` if the path is outside `public_prefix` or the
/// name is not a plain stored filename.
pub fn map_upload_path(upload_dir: &Path, public_prefix: &str, uri: &str) -> Option<PathBuf> {
    let prefix = format!("{}/", public_prefix.trim_end_matches('/'));
    let name = uri.strip_prefix(&prefix)?;

    // Only flat, already-sanitized names; staging stays private.
    if name.is_empty() || name.contains('/') || name.starts_with('.') {
        return None;
    }
    if sanitize_filename::sanitize(name) != name {
        return None;
    }

    let candidate = upload_dir.join(name);
    candidate.is_file().then_some(candidate)
}
