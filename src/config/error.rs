//! Configuration error types with source location tracking
//!
//! Provides rich diagnostic output using miette for configuration errors.

// False positives from miette's derive macros - fields are used but rustc doesn't see it
#![allow(unused_assignments)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Convert a 1-based line/column pair (as reported by serde_json) to a byte offset
pub fn line_column_to_offset(content: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let line_start: usize = content
        .split_inclusive('\n')
        .take(line - 1)
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(content.len())
}

/// A single validation issue
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    /// Primary error message
    pub message: String,
    /// Optional help text with suggestions
    pub help: Option<String>,
}

impl ConfigIssue {
    /// Create an issue for a required field that is absent or blank
    pub fn missing(field: &'static str, help: impl Into<String>) -> Self {
        Self {
            message: format!("'{field}' must not be empty"),
            help: Some(help.into()),
        }
    }
}

/// Individual validation issue wrapped for miette's `#[related]` attribute
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct ConfigIssueDiagnostic {
    message: String,
    #[help]
    help: Option<String>,
}

/// Collection of configuration validation errors
#[derive(Debug, Error, Diagnostic)]
#[error(
    "configuration '{source_name}' has {count} error{s}",
    count = self.issue_count(),
    s = if self.issue_count() == 1 { "" } else { "s" }
)]
#[diagnostic(code(spotify_keyfwd::config::validation))]
pub struct ConfigValidationError {
    source_name: String,

    #[related]
    issues: Vec<ConfigIssueDiagnostic>,
}

impl ConfigValidationError {
    pub fn new(source_name: impl Into<String>, issues: Vec<ConfigIssue>) -> Self {
        let issues = issues
            .into_iter()
            .map(|issue| ConfigIssueDiagnostic {
                message: issue.message,
                help: issue.help,
            })
            .collect();
        Self {
            source_name: source_name.into(),
            issues,
        }
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}

/// Top-level configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(spotify_keyfwd::config::io),
        help("pass the config path as the first argument")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {msg}")]
    #[diagnostic(code(spotify_keyfwd::config::parse))]
    Parse {
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: Option<SourceSpan>,
        msg: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ConfigValidationError),
}

impl ConfigError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(
        source_name: impl Into<String>,
        source_content: String,
        err: serde_json::Error,
    ) -> Self {
        // serde_json reports line 0 for errors without a position
        let span = (err.line() > 0).then(|| {
            let offset = line_column_to_offset(&source_content, err.line(), err.column());
            SourceSpan::from((offset, 0))
        });
        let name: String = source_name.into();
        Self::Parse {
            src: NamedSource::new(name, source_content),
            span,
            msg: err.to_string(),
        }
    }
}
