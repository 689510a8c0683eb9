//! Ancestor "start" file resolution
//!
//! A template inherits shared setup from start files placed in its own
//! directory and in every parent directory up to the root. Changes to any of
//! those files can change the template's compiled output.

use crate::path::{normalize_path, split_parent, SEPARATOR};

/// Default name of the start file templates inherit from
pub const DEFAULT_START_FILE_NAME: &str = "_start.tpl";

/// Computes the candidate start-file locations a template depends on.
///
/// Pure path computation, no file system access.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    start_file_name: String,
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_START_FILE_NAME)
    }
}

impl DependencyResolver {
    /// Create a resolver for the given start file name
    pub fn new(start_file_name: impl Into<String>) -> Self {
        Self {
            start_file_name: start_file_name.into(),
        }
    }

    /// Name of the start file this resolver looks for
    pub fn start_file_name(&self) -> &str {
        &self.start_file_name
    }

    /// Candidate start-file locations for `path`, nearest directory first.
    ///
    /// The path itself is never returned, so a start file only depends on
    /// start files in strictly higher directories.
    pub fn locations_for(&self, path: &str) -> Vec<String> {
        let path = normalize_path(path);
        let mut locations = Vec::new();
        let mut directory = split_parent(&path).0;

        loop {
            let candidate = match directory {
                Some(dir) => format!("{}{}{}", dir, SEPARATOR, self.start_file_name),
                None => self.start_file_name.clone(),
            };
            if candidate != *path {
                locations.push(candidate);
            }

            match directory {
                Some(dir) => directory = split_parent(dir).0,
                None => break,
            }
        }

        locations
    }

    /// Whether `path` names a start file
    pub fn is_start_file(&self, path: &str) -> bool {
        let path = normalize_path(path);
        split_parent(&path).1 == self.start_file_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_path_locations() {
        let resolver = DependencyResolver::default();
        assert_eq!(
            resolver.locations_for("Views/Home/Index.tpl"),
            vec![
                "Views/Home/_start.tpl".to_string(),
                "Views/_start.tpl".to_string(),
                "_start.tpl".to_string(),
            ]
        );
    }

    #[test]
    fn test_root_level_template() {
        let resolver = DependencyResolver::default();
        assert_eq!(resolver.locations_for("index.tpl"), vec!["_start.tpl".to_string()]);
    }

    #[test]
    fn test_start_file_excludes_itself() {
        let resolver = DependencyResolver::default();
        assert_eq!(
            resolver.locations_for("Views/_start.tpl"),
            vec!["_start.tpl".to_string()]
        );
        assert!(resolver.locations_for("_start.tpl").is_empty());
    }

    #[test]
    fn test_input_is_normalized() {
        let resolver = DependencyResolver::default();
        assert_eq!(
            resolver.locations_for("\\Views\\Index.tpl"),
            resolver.locations_for("Views/Index.tpl")
        );
    }

    #[test]
    fn test_custom_start_file_name() {
        let resolver = DependencyResolver::new("_layout");
        assert_eq!(
            resolver.locations_for("a/b.tpl"),
            vec!["a/_layout".to_string(), "_layout".to_string()]
        );
        assert!(resolver.is_start_file("a/_layout"));
        assert!(!resolver.is_start_file("a/b.tpl"));
    }

    #[test]
    fn test_locations_are_unique_and_bounded() {
        let resolver = DependencyResolver::default();
        let locations = resolver.locations_for("a/b/c/d/e/f.tpl");
        assert_eq!(locations.len(), 6);

        let mut deduped = locations.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), locations.len());
    }
}
