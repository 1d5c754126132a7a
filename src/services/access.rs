use crate::models::principal::Principal;

/// Split a client-supplied logical path into its segments, accepting both
/// separators. One trailing separator is ignored.
pub fn segments(logical_path: &str) -> Vec<&str> {
    let trimmed = logical_path
        .strip_suffix('/')
        .or_else(|| logical_path.strip_suffix('\\'))
        .unwrap_or(logical_path);
    trimmed.split(['/', '\\']).collect()
}

/// Decide whether `principal` may read `logical_path`.
///
/// Everything outside the private tree is readable by any authenticated
/// principal. Inside it, the second segment names the private folder and must
/// be one the principal holds a grant for; the bare private root is never
/// addressable.
pub fn permits(principal: &Principal, private_marker: &str, logical_path: &str) -> bool {
    let parts = segments(logical_path);
    if parts.first() != Some(&private_marker) {
        return true;
    }
    match parts.get(1) {
        Some(folder) => principal.has_folder(folder),
        None => false,
    }
}
