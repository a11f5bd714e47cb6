//! Helpers for `/`-delimited object keys.
//!
//! A key names an object relative to the bucket root. Folder keys carry a
//! trailing `/`; file keys do not. The root of a container is the configured
//! prefix, which is either empty or itself ends in `/`.

/// Key separator used by the object store.
pub const SEPARATOR: char = '/';

/// Split a key into its non-empty segments and report whether it is a folder marker.
pub fn split(key: &str) -> (Vec<&str>, bool) {
    let is_folder = key.ends_with(SEPARATOR);
    let segments = key.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
    (segments, is_folder)
}

/// Build the key of a child under `parent_key`.
pub fn child_key(parent_key: &str, name: &str, is_folder: bool) -> String {
    let mut key = String::with_capacity(parent_key.len() + name.len() + 1);
    key.push_str(parent_key);
    if !key.is_empty() && !key.ends_with(SEPARATOR) {
        key.push(SEPARATOR);
    }
    key.push_str(name);
    if is_folder {
        key.push(SEPARATOR);
    }
    key
}

/// Normalize a configured prefix so it is empty or ends with `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}{}", trimmed, SEPARATOR)
    }
}

/// Strip the bucket/identity prefix so the key is bucket-relative for the API.
pub fn strip_prefix<'a>(key: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return key;
    }
    key.strip_prefix(prefix).unwrap_or(key)
}

/// Whether `name` is usable as a single key segment.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(SEPARATOR)
}
