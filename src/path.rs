//! Cache key normalization

use std::borrow::Cow;

/// Separator used in normalized keys
pub const SEPARATOR: char = '/';

/// Normalize a relative template path into a cache key.
///
/// Case is preserved. Backslashes become `/`, runs of separators collapse to
/// one and leading separators are stripped. Already-normalized input is
/// returned borrowed.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    if is_normalized(path) {
        return Cow::Borrowed(path);
    }

    let mut normalized = String::with_capacity(path.len());
    let mut previous_was_separator = true;

    for ch in path.chars() {
        let ch = if ch == '\\' { SEPARATOR } else { ch };
        if ch == SEPARATOR {
            if !previous_was_separator {
                normalized.push(SEPARATOR);
            }
            previous_was_separator = true;
        } else {
            normalized.push(ch);
            previous_was_separator = false;
        }
    }

    Cow::Owned(normalized)
}

fn is_normalized(path: &str) -> bool {
    if path.starts_with(SEPARATOR) || path.contains('\\') {
        return false;
    }
    !path.contains("//")
}

/// Split a normalized path into its directory part and file name.
pub(crate) fn split_parent(path: &str) -> (Option<&str>, &str) {
    match path.rfind(SEPARATOR) {
        Some(index) => (Some(&path[..index]), &path[index + 1..]),
        None => (None, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_input_is_borrowed() {
        let key = normalize_path("Views/Home/Index.tpl");
        assert!(matches!(key, Cow::Borrowed(_)));
        assert_eq!(key, "Views/Home/Index.tpl");
    }

    #[test]
    fn test_backslashes_and_leading_separators() {
        assert_eq!(normalize_path("\\Views\\Home\\Index.tpl"), "Views/Home/Index.tpl");
        assert_eq!(normalize_path("///Views/Index.tpl"), "Views/Index.tpl");
        assert_eq!(normalize_path("/\\Views/Index.tpl"), "Views/Index.tpl");
    }

    #[test]
    fn test_repeated_separators_collapse() {
        assert_eq!(normalize_path("Views//Home\\\\Index.tpl"), "Views/Home/Index.tpl");
    }

    #[test]
    fn test_case_preserved() {
        assert_eq!(normalize_path("/VIEWS/home/Index.TPL"), "VIEWS/home/Index.TPL");
        assert_ne!(normalize_path("views/index.tpl"), normalize_path("Views/Index.tpl"));
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("Views/Home/Index.tpl"), (Some("Views/Home"), "Index.tpl"));
        assert_eq!(split_parent("Index.tpl"), (None, "Index.tpl"));
    }
}
