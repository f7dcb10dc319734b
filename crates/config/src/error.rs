//! Configuration errors and warnings.

use thiserror::Error;

/// Fatal configuration problems. Any of these aborts startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {message}")]
    Io { path: String, message: String },

    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("option '{option}' in {section} may only be given once (line {line})")]
    DuplicateOption {
        section: String,
        option: String,
        line: usize,
    },

    #[error("missing required option '{option}' in {section}")]
    MissingOption { section: String, option: String },

    #[error("invalid value '{value}' for option '{option}' in {section}: {reason}")]
    InvalidValue {
        section: String,
        option: String,
        value: String,
        reason: String,
    },

    #[error("{option} refers to unknown {kind} '{name}'")]
    UnknownDefault {
        option: String,
        kind: String,
        name: String,
    },
}

/// Non-fatal anomalies found while parsing. The offending value is
/// discarded and parsing continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// An option the enclosing section does not know (or an option outside
    /// of any section)
    UnusedOption {
        section: Option<String>,
        option: String,
        value: String,
        line: usize,
    },
    /// A section name that is not recognized
    UnusedSection { section: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::UnusedOption {
                section: Some(section),
                option,
                value,
                line,
            } => write!(
                f,
                "unknown option '{option}' in {section} (line {line}), value '{value}' ignored"
            ),
            ConfigWarning::UnusedOption {
                section: None,
                option,
                value,
                line,
            } => write!(
                f,
                "option '{option}' outside of any section (line {line}), value '{value}' ignored"
            ),
            ConfigWarning::UnusedSection { section } => {
                write!(f, "unknown section {section} ignored")
            }
        }
    }
}
