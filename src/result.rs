//! Lookup results and compiler diagnostics

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Output of a compile call: the artifact, or the diagnostics explaining why
/// compilation failed
pub type CompilationResult<A> = std::result::Result<A, Vec<Diagnostic>>;

/// Severity of a compiler diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Error => write!(f, "error"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Info => write!(f, "info"),
        }
    }
}

/// A message reported by the template compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Template the diagnostic refers to
    pub path: String,

    /// Human readable message
    pub message: String,

    /// 1-based line, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// 1-based column, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    pub severity: DiagnosticSeverity,
}

impl Diagnostic {
    /// Create an error diagnostic without a source location
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            line: None,
            column: None,
            severity: DiagnosticSeverity::Error,
        }
    }

    /// Attach a source location
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Change the severity
    pub fn with_severity(mut self, severity: DiagnosticSeverity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(
                f,
                "{}({},{}): {}: {}",
                self.path, line, column, self.severity, self.message
            ),
            _ => write!(f, "{}: {}: {}", self.path, self.severity, self.message),
        }
    }
}

/// Result of [`CompilationCache::get_or_add`](crate::CompilationCache::get_or_add)
#[derive(Debug)]
pub enum CacheLookupResult<A> {
    /// The template file does not exist
    FileNotFound,

    /// The compiled artifact, shared with the cache
    Found(Arc<A>),

    /// The compiler rejected the template; nothing was cached
    Failed(Vec<Diagnostic>),
}

impl<A> CacheLookupResult<A> {
    /// Whether an artifact was returned
    pub fn is_found(&self) -> bool {
        matches!(self, CacheLookupResult::Found(_))
    }

    /// Whether the file was missing
    pub fn is_file_not_found(&self) -> bool {
        matches!(self, CacheLookupResult::FileNotFound)
    }

    /// The artifact, if one was returned
    pub fn artifact(&self) -> Option<&Arc<A>> {
        match self {
            CacheLookupResult::Found(artifact) => Some(artifact),
            _ => None,
        }
    }

    /// Consume the result, returning the artifact if one was found
    pub fn into_artifact(self) -> Option<Arc<A>> {
        match self {
            CacheLookupResult::Found(artifact) => Some(artifact),
            _ => None,
        }
    }

    /// Compiler diagnostics, empty unless compilation failed
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CacheLookupResult::Failed(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

impl<A> Clone for CacheLookupResult<A> {
    fn clone(&self) -> Self {
        match self {
            CacheLookupResult::FileNotFound => CacheLookupResult::FileNotFound,
            CacheLookupResult::Found(artifact) => CacheLookupResult::Found(artifact.clone()),
            CacheLookupResult::Failed(diagnostics) => {
                CacheLookupResult::Failed(diagnostics.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::error("Views/Index.tpl", "unexpected '}'").at(12, 4);
        assert_eq!(
            diagnostic.to_string(),
            "Views/Index.tpl(12,4): error: unexpected '}'"
        );

        let warning = Diagnostic::error("a.tpl", "unused block")
            .with_severity(DiagnosticSeverity::Warning);
        assert_eq!(warning.to_string(), "a.tpl: warning: unused block");
    }

    #[test]
    fn test_lookup_result_accessors() {
        let found: CacheLookupResult<String> =
            CacheLookupResult::Found(Arc::new("page".to_string()));
        assert!(found.is_found());
        assert_eq!(found.artifact().map(|a| a.as_str()), Some("page"));
        assert!(found.diagnostics().is_empty());

        let missing: CacheLookupResult<String> = CacheLookupResult::FileNotFound;
        assert!(missing.is_file_not_found());
        assert!(missing.clone().into_artifact().is_none());

        let failed: CacheLookupResult<String> =
            CacheLookupResult::Failed(vec![Diagnostic::error("a.tpl", "boom")]);
        assert!(!failed.is_found());
        assert_eq!(failed.diagnostics().len(), 1);
    }

    #[test]
    fn test_diagnostic_serialization() {
        let diagnostic = Diagnostic::error("a.tpl", "boom");
        let json = serde_json::to_string(&diagnostic).unwrap();
        assert!(json.contains("\"severity\":\"error\""));
        assert!(!json.contains("line"));
    }
}
