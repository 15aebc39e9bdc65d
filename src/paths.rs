use std::path::{Path, PathBuf};

use url::Url;

/// Local path (relative to the output root) for a mirrored page. Empty and
/// `/`-terminated URL paths become an `index.html` in the matching directory;
/// an extensionless final segment is treated as a directory.
pub fn page_path(url: &Url) -> PathBuf {
    let path = url.path();
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return PathBuf::from("index.html");
    }
    if path.ends_with('/') {
        return PathBuf::from(format!("{trimmed}index.html"));
    }

    let last_segment = trimmed.rsplit('/').next().unwrap_or_default();
    if last_segment.contains('.') {
        PathBuf::from(trimmed)
    } else {
        PathBuf::from(format!("{trimmed}/index.html"))
    }
}

/// Local path (relative to the output root) for a downloaded resource, under
/// the `assets/` subtree. A query string appends a sanitized suffix so
/// distinct query variants of one path land in distinct files.
pub fn resource_path(url: &Url) -> PathBuf {
    let mut name = url.path().trim_start_matches('/').to_owned();
    if name.is_empty() {
        name = "resource".to_owned();
    }

    if let Some(query) = url.query() {
        let sanitized: String = query
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if !sanitized.is_empty() {
            name.push('_');
            name.push_str(&sanitized);
        }
    }

    PathBuf::from("assets").join(name)
}

/// Relative path from `start_dir` to `target`, with forward slashes. Both
/// arguments are output-root-relative, so the result is stable across runs
/// and output locations.
pub fn relative_from(target: &Path, start_dir: &Path) -> String {
    let target_parts: Vec<_> = target.components().collect();
    let start_parts: Vec<_> = start_dir.components().collect();

    let mut shared = 0;
    while shared < target_parts.len().min(start_parts.len())
        && target_parts[shared] == start_parts[shared]
    {
        shared += 1;
    }

    let mut segments: Vec<String> = vec!["..".to_owned(); start_parts.len() - shared];
    segments.extend(
        target_parts[shared..]
            .iter()
            .map(|part| part.as_os_str().to_string_lossy().into_owned()),
    );

    if segments.is_empty() {
        ".".to_owned()
    } else {
        segments.join("/")
    }
}
