//! ``src/util/path.rs``
//! ============================================================================
//! # Path helpers for the virtual namespace
//!
//! Paths are slash-delimited (either `/` or `\`), may carry a `Drive:` prefix,
//! and are compared case-insensitively everywhere.

use compact_str::CompactString;

/// Characters that separate path segments.
pub const SEPARATORS: [char; 2] = ['/', '\\'];

/// Replacement used when a node name carries a separator.
const SAFE_SEPARATOR: char = '-';

#[inline]
#[must_use]
pub fn is_separator(c: char) -> bool {
    SEPARATORS.contains(&c)
}

/// Rewrites `name` so that it is always a single path segment.
#[must_use]
pub fn make_safe_name(name: &str) -> CompactString {
    name.chars()
        .map(|c| if is_separator(c) { SAFE_SEPARATOR } else { c })
        .collect()
}

/// Unicode-aware case-insensitive equality.
#[must_use]
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.eq_ignore_ascii_case(b)
        || a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
}

/// Lower-cases `name` for use as a lookup key.
#[must_use]
pub fn fold_case(name: &str) -> CompactString {
    name.chars().flat_map(char::to_lowercase).collect()
}

/// Strips a leading `Drive:` qualifier, if any.
#[must_use]
pub fn strip_drive(path: &str) -> &str {
    match path.find(':') {
        Some(idx) if !path[..idx].contains(SEPARATORS) => &path[idx + 1..],
        _ => path,
    }
}

/// Splits a path into its non-blank segments, dropping any drive qualifier.
#[must_use]
pub fn split_segments(path: &str) -> Vec<&str> {
    strip_drive(path)
        .split(SEPARATORS)
        .filter(|segment| !segment.trim().is_empty())
        .collect()
}

/// True when `path` names the root of the namespace.
#[must_use]
pub fn is_root(path: &str) -> bool {
    split_segments(path).is_empty()
}

/// Removes trailing separators.
#[must_use]
pub fn trim_end_separators(path: &str) -> &str {
    path.trim_end_matches(SEPARATORS)
}

/// Parent portion of `path` without a trailing separator.
///
/// `Tree:/a/b` -> `Tree:/a`, `/a` -> `` (the root has no directory part).
#[must_use]
pub fn dir_of(path: &str) -> &str {
    let trimmed = trim_end_separators(path);
    trimmed
        .rfind(SEPARATORS)
        .map_or("", |idx| trim_end_separators(&trimmed[..idx]))
}

/// Final segment of `path`, ignoring trailing separators.
#[must_use]
pub fn leaf_name(path: &str) -> &str {
    let trimmed = trim_end_separators(path);
    trimmed
        .rfind(SEPARATORS)
        .map_or_else(|| strip_drive(trimmed), |idx| &trimmed[idx + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_safe_name_replaces_both_separators() {
        assert_eq!(make_safe_name("a/b\\c"), "a-b-c");
        assert_eq!(make_safe_name("plain"), "plain");
    }

    #[test]
    fn test_split_segments_drops_blanks_and_drive() {
        assert_eq!(split_segments("Tree:\\Erin//Mike/ "), vec!["Erin", "Mike"]);
        assert_eq!(split_segments("/"), Vec::<&str>::new());
        assert!(is_root("Tree:\\"));
        assert!(is_root(""));
    }

    #[test]
    fn test_dir_and_leaf() {
        assert_eq!(dir_of("Tree:/Erin/Mike/"), "Tree:/Erin");
        assert_eq!(leaf_name("Tree:/Erin/Mike/"), "Mike");
        assert_eq!(dir_of("/Erin"), "");
        assert_eq!(leaf_name("Erin"), "Erin");
    }

    #[test]
    fn test_case_folding() {
        assert!(eq_ignore_case("ERIN", "erin"));
        assert!(eq_ignore_case("Straße", "STRAẞE".to_lowercase().as_str()));
        assert!(!eq_ignore_case("erin", "erik"));
        assert_eq!(fold_case("MiKe"), "mike");
    }
}
