//! Extension denylist applied to candidate file names before anything is fetched.

/// Returns true when the final dot-delimited suffix of `filename` is in
/// `ignored_exts`. Comparison is case-insensitive; names without an extension
/// are never ignored.
pub fn is_ignored<S: AsRef<str>>(filename: &str, ignored_exts: &[S]) -> bool {
    let Some(extension) = extension_of(filename) else {
        return false;
    };

    ignored_exts.iter().any(|ignored| {
        let ignored = ignored.as_ref().trim_start_matches('.');
        !ignored.is_empty() && extension.eq_ignore_ascii_case(ignored)
    })
}

fn extension_of(filename: &str) -> Option<&str> {
    // Only the last path segment carries the extension.
    let name = filename.rsplit('/').next().unwrap_or(filename);
    let (stem, extension) = name.rsplit_once('.')?;

    // ".profile" style names have no extension.
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension)
}
