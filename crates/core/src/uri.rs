//! Helpers for building remote object URIs

/// Join a URI prefix and a relative segment with exactly one `/` between them.
///
/// An empty segment returns the prefix unchanged. A trailing `/` on the
/// segment is kept, so directory URIs stay directory-shaped.
pub fn join_uri(prefix: &str, segment: &str) -> String {
    let segment = segment.trim_start_matches('/');
    if segment.is_empty() {
        return prefix.to_string();
    }
    if prefix.ends_with('/') {
        format!("{prefix}{segment}")
    } else {
        format!("{prefix}/{segment}")
    }
}
