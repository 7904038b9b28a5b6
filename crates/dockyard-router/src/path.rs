//! Request path normalization for static serving.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Percent-decode `raw` and apply the single-page-app rewrite: `/` and
/// extensionless paths outside `static_prefix` become `default_document`.
///
/// Dot segments are resolved without ever climbing above the root.
pub fn normalize(raw: &str, static_prefix: &str, default_document: &str) -> String {
    let decoded: Cow<'_, str> = percent_decode_str(raw).decode_utf8_lossy();

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let path = format!("/{}", segments.join("/"));

    let has_extension = segments.last().is_some_and(|last| last.contains('.'));
    if path == "/" || (!has_extension && !under_prefix(&path, static_prefix)) {
        return default_document.to_string();
    }
    path
}

/// `/static` and `/static/...` are under `/static`; `/staticky` is not.
fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Artifact key of a normalized path.
pub fn artifact_key(project: &str, path: &str) -> String {
    format!("{}{path}", dockyard_core::keys::publish_prefix(project))
}
