//! Section/option lexer for the configuration document.
//!
//! The document is line oriented:
//!
//! ```text
//! # comment
//! [account]
//! dir = /var/lib/macen
//!
//! [verification "http"]
//! type = http01
//! listener = 0.0.0.0:80
//! ```
//!
//! Options that appear before the first section header belong to the
//! general (unnamed) section. Headers that repeat are merged, so their
//! options are appended in document order.

use tracing::trace;

use crate::error::ConfigError;

/// One `key = value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionLine {
    pub key: String,
    pub value: String,
    pub line: usize,
}

/// Header of a section, e.g. `[storage "files"]` has kind `storage` and
/// argument `files`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionHeader {
    pub kind: String,
    pub argument: Option<String>,
}

impl std::fmt::Display for SectionHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.argument {
            Some(arg) => write!(f, "[{} \"{}\"]", self.kind, arg),
            None => write!(f, "[{}]", self.kind),
        }
    }
}

/// A section together with its options in document order.
#[derive(Debug, Clone)]
pub struct RawSection {
    pub header: SectionHeader,
    pub options: Vec<OptionLine>,
}

/// Lexed document.
#[derive(Debug, Default)]
pub struct Document {
    /// Options without an enclosing section
    pub general: Vec<OptionLine>,
    /// Sections in order of first appearance
    pub sections: Vec<RawSection>,
}

impl Document {
    /// Split `input` into the general options and the named sections.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut doc = Document::default();
        // Index into `sections` of the section currently receiving options
        let mut current: Option<usize> = None;

        for (idx, raw) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') {
                let header = parse_header(line, line_no)?;
                trace!(section = %header, line = line_no, "Entering section");
                current = Some(match doc.sections.iter().position(|s| s.header == header) {
                    Some(existing) => existing,
                    None => {
                        doc.sections.push(RawSection {
                            header,
                            options: Vec::new(),
                        });
                        doc.sections.len() - 1
                    }
                });
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    message: format!("expected `key = value` or a section header, got `{line}`"),
                });
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    message: "option without a name".to_string(),
                });
            }

            let option = OptionLine {
                key: key.to_string(),
                value: value.trim().to_string(),
                line: line_no,
            };

            match current {
                Some(idx) => doc.sections[idx].options.push(option),
                None => doc.general.push(option),
            }
        }

        Ok(doc)
    }
}

fn parse_header(line: &str, line_no: usize) -> Result<SectionHeader, ConfigError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| ConfigError::Syntax {
            line: line_no,
            message: format!("unterminated section header `{line}`"),
        })?
        .trim();

    let (kind, argument) = match inner.split_once(char::is_whitespace) {
        Some((kind, rest)) => {
            let rest = rest.trim();
            let argument = rest
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .ok_or_else(|| ConfigError::Syntax {
                    line: line_no,
                    message: format!("section argument must be quoted in `{line}`"),
                })?;
            (kind, Some(argument.to_string()))
        }
        None => (inner, None),
    };

    if kind.is_empty() {
        return Err(ConfigError::Syntax {
            line: line_no,
            message: "empty section name".to_string(),
        });
    }

    Ok(SectionHeader {
        kind: kind.to_string(),
        argument,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_options_before_first_section() {
        let doc = Document::parse("acme-server = https://x\n[account]\ndir = /tmp\n").unwrap();
        assert_eq!(doc.general.len(), 1);
        assert_eq!(doc.general[0].key, "acme-server");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].options[0].value, "/tmp");
    }

    #[test]
    fn test_comments_and_indentation() {
        let doc = Document::parse(
            "
            [account]
            dir = /tmp/dir
            #acme-server https://acme.example.org/directory
            ; also a comment
            [mgmt]
            ",
        )
        .unwrap();
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].options.len(), 1);
        assert!(doc.sections[1].options.is_empty());
    }

    #[test]
    fn test_quoted_section_argument() {
        let doc = Document::parse("[verification \"http234\"]\ntype = http01\n").unwrap();
        assert_eq!(doc.sections[0].header.kind, "verification");
        assert_eq!(doc.sections[0].header.argument.as_deref(), Some("http234"));
    }

    #[test]
    fn test_empty_value_is_kept() {
        let doc = Document::parse("[mgmt]\ndefault-verification=\n").unwrap();
        assert_eq!(doc.sections[0].options[0].value, "");
    }

    #[test]
    fn test_repeated_sections_are_merged() {
        let doc = Document::parse("[mgmt]\nlistener = a\n[account]\n[mgmt]\nlistener = b\n").unwrap();
        assert_eq!(doc.sections.len(), 2);
        let values: Vec<_> = doc.sections[0].options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, ["a", "b"]);
    }

    #[test]
    fn test_value_may_contain_equals_sign() {
        let doc = Document::parse("[account]\nacme-server = https://x/?a=b\n").unwrap();
        assert_eq!(doc.sections[0].options[0].value, "https://x/?a=b");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            Document::parse("[account]\njust-a-word\n"),
            Err(ConfigError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            Document::parse("[account\n"),
            Err(ConfigError::Syntax { line: 1, .. })
        ));
        assert!(matches!(
            Document::parse("[storage files]\n"),
            Err(ConfigError::Syntax { line: 1, .. })
        ));
    }
}
