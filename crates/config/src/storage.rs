//! `[storage "<name>"]` sections.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::options::SectionOptions;

/// Name given to the built-in discarding store.
pub const BUILTIN_NONE_NAME: &str = "none";

/// A named certificate store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub name: String,
    pub kind: StorageKind,
}

/// Store variants selected by the section's `type` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    /// `type = none`: certificates are discarded
    None,
    /// `type = file`
    File(FileStorageConfig),
}

impl StorageKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StorageKind::None => "none",
            StorageKind::File(_) => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStorageConfig {
    pub directory: PathBuf,
}

impl StorageConfig {
    /// The store synthesized when no `[storage]` section exists.
    pub fn builtin_none() -> Self {
        Self {
            name: BUILTIN_NONE_NAME.to_string(),
            kind: StorageKind::None,
        }
    }

    pub(crate) fn parse(name: &str, opts: &mut SectionOptions) -> Result<Self, ConfigError> {
        let kind = match opts.required("type")?.as_str() {
            "none" => StorageKind::None,
            "file" => StorageKind::File(FileStorageConfig {
                directory: PathBuf::from(opts.required("directory")?),
            }),
            other => {
                return Err(opts.invalid("type", other, "supported storage types: none, file"))
            }
        };

        Ok(Self {
            name: name.to_string(),
            kind,
        })
    }
}
