use std::fs;
use std::path::{Component, Path, PathBuf};

use url::Url;

/// Join two URI or path fragments with exactly one `/` between them.
///
/// The result has no trailing slash unless it is a bare root such as
/// `file:///` or `/`.
pub(crate) fn join_uri(base: &str, relative: &str) -> String {
    let rooted = relative.starts_with('/');
    let relative = relative.trim_start_matches('/');
    let relative = trim_trailing_slash(relative);
    if base.is_empty() {
        // An absolute path keeps its root.
        return if rooted {
            format!("/{relative}")
        } else {
            relative.to_string()
        };
    }
    let head = trim_trailing_slash(base);
    if relative.is_empty() {
        return head.to_string();
    }
    if head.ends_with('/') {
        format!("{head}{relative}")
    } else {
        format!("{head}/{relative}")
    }
}

/// Strip trailing slashes without eating into a scheme's `//` or a lone root.
pub(crate) fn trim_trailing_slash(value: &str) -> &str {
    let floor = value.find("://").map_or(0, |index| index + 3);
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.len() < floor {
        return value;
    }
    trimmed
}

/// Parse `value` as an absolute URI. Windows drive paths are not URIs.
pub(crate) fn parse_absolute_uri(value: &str) -> Option<Url> {
    let url = Url::parse(value).ok()?;
    if url.scheme().len() < 2 {
        return None;
    }
    Some(url)
}

/// Final non-empty path segment of a URI or path string.
pub(crate) fn file_name_of(uri: &str) -> Option<String> {
    let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
    without_query
        .split(['/', '\\'])
        .rev()
        .find(|segment| !segment.is_empty())
        .map(|segment| percent_decode(segment))
}

/// Decode `%XX` escapes; malformed escapes are kept verbatim.
pub(crate) fn percent_decode(value: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(value.as_bytes())).into_owned()
}

/// Normal path components as owned strings, for suffix comparisons.
pub(crate) fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Number of trailing components shared by `left` and `right`.
pub(crate) fn common_suffix_len(left: &[String], right: &[String]) -> usize {
    left.iter()
        .rev()
        .zip(right.iter().rev())
        .take_while(|(a, b)| a == b)
        .count()
}

/// Rewrite `path` so every component uses the casing found on disk.
///
/// Components that cannot be listed are kept as given.
pub(crate) fn match_disk_casing(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        let Component::Normal(name) = component else {
            resolved.push(component.as_os_str());
            continue;
        };
        let on_disk = disk_entry_name(&resolved, &name.to_string_lossy());
        match on_disk {
            Some(entry) => resolved.push(entry),
            None => resolved.push(name),
        }
    }
    resolved
}

fn disk_entry_name(parent: &Path, name: &str) -> Option<String> {
    let listing = if parent.as_os_str().is_empty() {
        fs::read_dir(".")
    } else {
        fs::read_dir(parent)
    };
    let mut folded = None;
    for entry in listing.ok()?.flatten() {
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        if entry_name == name {
            return Some(entry_name);
        }
        if folded.is_none() && entry_name.to_lowercase() == name.to_lowercase() {
            folded = Some(entry_name);
        }
    }
    folded
}
