use crate::config::LocationConfig;
use std::collections::BTreeMap;

/// Resolves a request path to a location.
///
/// `"/"` matches itself unconditionally. Any other exact match is returned,
/// unless it names a directory (trailing `/`) with autoindex off. Without an
/// exact match the longest prefix wins, and only when its autoindex is on.
pub fn match_location<'a>(
    path: &str,
    locations: &'a BTreeMap<String, LocationConfig>,
) -> Option<&'a LocationConfig> {
    if let Some(location) = locations.get(path) {
        if path == "/" {
            return Some(location);
        }
        if path.ends_with('/') && !location.autoindex {
            return None;
        }
        return Some(location);
    }

    let (_, best) = locations
        .iter()
        .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())?;

    best.autoindex.then_some(best)
}
