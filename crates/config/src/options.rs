//! Typed access to the options of one section.
//!
//! Every accessor consumes the options it reads. Whatever is left when the
//! section is finished was not understood and is reported as a warning.

use std::str::FromStr;

use tracing::trace;

use crate::document::OptionLine;
use crate::error::{ConfigError, ConfigWarning};
use crate::values::{parse_bool, parse_size, parse_u64};

/// Options of one section, consumed as they are interpreted.
#[derive(Debug)]
pub(crate) struct SectionOptions {
    section: String,
    options: Vec<OptionLine>,
}

impl SectionOptions {
    pub(crate) fn new(section: impl Into<String>, options: Vec<OptionLine>) -> Self {
        Self {
            section: section.into(),
            options,
        }
    }

    pub(crate) fn section(&self) -> &str {
        &self.section
    }

    /// Take a single-valued option. Giving it twice is an error.
    pub(crate) fn single(&mut self, key: &str) -> Result<Option<String>, ConfigError> {
        let mut found = self.take_all(key).into_iter();
        let first = found.next();
        if let Some(dup) = found.next() {
            return Err(ConfigError::DuplicateOption {
                section: self.section.clone(),
                option: key.to_string(),
                line: dup.line,
            });
        }
        Ok(first.map(|o| o.value))
    }

    /// Take a required single-valued option.
    pub(crate) fn required(&mut self, key: &str) -> Result<String, ConfigError> {
        match self.single(key)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::MissingOption {
                section: self.section.clone(),
                option: key.to_string(),
            }),
        }
    }

    /// Take every value of a repeatable option, in document order.
    pub(crate) fn multi(&mut self, key: &str) -> Vec<String> {
        self.take_all(key).into_iter().map(|o| o.value).collect()
    }

    pub(crate) fn bool(&mut self, key: &str, default: bool) -> Result<bool, ConfigError> {
        self.parsed(key, default, parse_bool, "expected yes or no")
    }

    pub(crate) fn size(&mut self, key: &str, default: u64) -> Result<u64, ConfigError> {
        self.parsed(
            key,
            default,
            parse_size,
            "expected a byte count, optionally suffixed with k or m",
        )
    }

    pub(crate) fn u64(&mut self, key: &str, default: u64) -> Result<u64, ConfigError> {
        self.parsed(key, default, parse_u64, "expected a non-negative integer")
    }

    /// Take a single-valued option and parse it with [`FromStr`].
    pub(crate) fn typed<T>(&mut self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.single(key)? else {
            return Ok(None);
        };
        value
            .parse::<T>()
            .map(Some)
            .map_err(|e| self.invalid(key, &value, e.to_string()))
    }

    pub(crate) fn invalid(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section.clone(),
            option: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Report every option nobody asked for.
    pub(crate) fn finish(self, warnings: &mut Vec<ConfigWarning>) {
        for option in self.options {
            trace!(section = %self.section, option = %option.key, "Unused option");
            warnings.push(ConfigWarning::UnusedOption {
                section: Some(self.section.clone()),
                option: option.key,
                value: option.value,
                line: option.line,
            });
        }
    }

    fn parsed<T>(
        &mut self,
        key: &str,
        default: T,
        parse: fn(&str) -> Option<T>,
        reason: &str,
    ) -> Result<T, ConfigError> {
        match self.single(key)? {
            None => Ok(default),
            Some(value) => parse(&value).ok_or_else(|| self.invalid(key, &value, reason)),
        }
    }

    fn take_all(&mut self, key: &str) -> Vec<OptionLine> {
        let (taken, rest) = std::mem::take(&mut self.options)
            .into_iter()
            .partition(|o| o.key == key);
        self.options = rest;
        taken
    }
}
