//! Default selection for validators and storages.
//!
//! Both `default-verification` and `default-storage` follow the same
//! precedence:
//!
//! 1. a non-empty option names the default, which must exist
//! 2. an empty option disables the default
//! 3. an absent option with exactly one entry makes that entry the default
//! 4. an absent option with zero or several entries selects nothing; with
//!    zero entries the caller may synthesize a built-in entry

use crate::error::ConfigError;

/// Outcome of default resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultChoice {
    /// Named explicitly by the option
    Explicit(String),
    /// The only configured entry
    Implicit(String),
    /// Option present but empty
    Disabled,
    /// Option absent, no entries
    NoEntries,
    /// Option absent, several entries
    Ambiguous,
}

impl DefaultChoice {
    /// Name of the chosen entry, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            DefaultChoice::Explicit(name) | DefaultChoice::Implicit(name) => Some(name),
            _ => None,
        }
    }
}

/// Resolve the default among `names`.
///
/// `option` is the option name used in error messages, `kind` describes the
/// entries (e.g. "verification").
pub fn resolve_default(
    option: &str,
    kind: &str,
    explicit: Option<&str>,
    names: &[&str],
) -> Result<DefaultChoice, ConfigError> {
    match explicit {
        Some("") => Ok(DefaultChoice::Disabled),
        Some(name) => {
            if names.contains(&name) {
                Ok(DefaultChoice::Explicit(name.to_string()))
            } else {
                Err(ConfigError::UnknownDefault {
                    option: option.to_string(),
                    kind: kind.to_string(),
                    name: name.to_string(),
                })
            }
        }
        None => match names {
            [] => Ok(DefaultChoice::NoEntries),
            [only] => Ok(DefaultChoice::Implicit(only.to_string())),
            _ => Ok(DefaultChoice::Ambiguous),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(explicit: Option<&str>, names: &[&str]) -> Result<DefaultChoice, ConfigError> {
        resolve_default("default-verification", "verification", explicit, names)
    }

    #[test]
    fn test_explicit_wins() {
        assert_eq!(
            resolve(Some("b"), &["a", "b"]).unwrap(),
            DefaultChoice::Explicit("b".into())
        );
    }

    #[test]
    fn test_explicit_must_exist() {
        let err = resolve(Some("c"), &["a", "b"]).unwrap_err();
        assert!(err.to_string().contains("default-verification"));
        assert!(err.to_string().contains("'c'"));
    }

    #[test]
    fn test_empty_disables_even_single_entry() {
        assert_eq!(resolve(Some(""), &["a"]).unwrap(), DefaultChoice::Disabled);
        assert_eq!(resolve(Some(""), &[]).unwrap(), DefaultChoice::Disabled);
    }

    #[test]
    fn test_single_entry_is_implicit_default() {
        let choice = resolve(None, &["http234"]).unwrap();
        assert_eq!(choice, DefaultChoice::Implicit("http234".into()));
        assert_eq!(choice.name(), Some("http234"));
    }

    #[test]
    fn test_absent_with_zero_or_many() {
        assert_eq!(resolve(None, &[]).unwrap(), DefaultChoice::NoEntries);
        assert_eq!(resolve(None, &["a", "b"]).unwrap(), DefaultChoice::Ambiguous);
        assert_eq!(DefaultChoice::Ambiguous.name(), None);
    }
}
