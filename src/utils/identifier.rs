pub const DEFAULT_IDENTIFIER: &str = "default_collection";

/// Maps a collection name onto a storage-safe identifier.
///
/// Every character outside `[A-Za-z0-9_]` becomes a single `_` and the result
/// is lower-cased. Absent or empty names map to [`DEFAULT_IDENTIFIER`].
pub fn sanitize(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    ch.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect(),
        _ => DEFAULT_IDENTIFIER.to_string(),
    }
}
