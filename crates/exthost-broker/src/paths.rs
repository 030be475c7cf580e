//! Extension resource path expansion.

use crate::origins::Origin;

/// Normalize a relative path: drop `.` and empty segments, let `..` pop.
/// The result always starts with `/`.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                let _ = segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Expand an extension-relative path against its origin. A missing or
/// empty path expands to nothing.
pub fn expand_resource_path(origin: &Origin, path: Option<&str>) -> Option<String> {
    path.filter(|p| !p.is_empty())
        .map(|p| format!("{origin}{}", normalize_path(p)))
}
