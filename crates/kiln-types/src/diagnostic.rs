//! Compiler diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Severity of a diagnostic, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Returns `true` for [`Severity::Error`].
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A structured compiler message.
///
/// Diagnostics are the single channel for compile-level failures. Any
/// error-severity diagnostic on a build marks that build as failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Which subsystem produced it ("build", "transpile", "fs", ...).
    pub kind: String,
    /// Short one-line summary.
    pub header: String,
    /// Full message text.
    pub message: String,
    /// Absolute path of the file the diagnostic points at, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// 1-based line number within `file`, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Diagnostic {
    fn new(severity: Severity, kind: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            severity,
            header: format!("{} {}", kind, severity),
            kind,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    /// Create an error diagnostic.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, message)
    }

    /// Create a warning diagnostic.
    pub fn warning(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    /// Create an informational diagnostic.
    pub fn info(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, kind, message)
    }

    /// Replace the generated header.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Attach a file location.
    pub fn with_file(mut self, file: impl Into<PathBuf>, line: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.header, self.message)?;
        if let Some(file) = &self.file {
            write!(f, " ({}", file.display())?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Returns `true` if any diagnostic has error severity.
pub fn has_error(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn has_error_only_counts_errors() {
        let warn = vec![Diagnostic::warning("build", "unused style")];
        assert!(!has_error(&warn));
        assert!(!has_error(&[]));

        let mixed = vec![
            Diagnostic::info("build", "starting"),
            Diagnostic::error("transpile", "unexpected token"),
        ];
        assert!(has_error(&mixed));
    }

    #[test]
    fn display_includes_location() {
        let diag = Diagnostic::error("transpile", "unexpected token")
            .with_file("/src/cmp.tsx", Some(12));
        assert_eq!(
            diag.to_string(),
            "[error] transpile error: unexpected token (/src/cmp.tsx:12)"
        );
    }

    #[test]
    fn serializes_lowercase_severity() {
        let diag = Diagnostic::warning("style", "unknown property");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["severity"], "warning");
        assert!(json.get("file").is_none());
    }
}
