use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes, suitable for mapping onto server responses.
pub mod codes {
    pub const FS_ERROR: &str = "FS_ERROR";
    pub const EXPORTS_NOT_OBJECT: &str = "EXPORTS_NOT_OBJECT";
    pub const EXPORT_KEY_INVALID: &str = "EXPORT_KEY_INVALID";
    pub const EXPORT_TARGET_INVALID: &str = "EXPORT_TARGET_INVALID";
    pub const ENTRY_FIELD_INVALID: &str = "ENTRY_FIELD_INVALID";
    pub const CONFIG_READ: &str = "CONFIG_READ";
    pub const CONFIG_PARSE: &str = "CONFIG_PARSE";
}

/// Core error type for depmap operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{op} failed for {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{manifest} has an \"exports\" property that is not an object")]
    ExportsNotObject { manifest: PathBuf },

    #[error("{manifest} has \"exports\" key {key:?} that does not start with \"./\"")]
    InvalidExportKey { manifest: PathBuf, key: String },

    #[error("{manifest} has \"exports[{key:?}]\" that is not a string, object, array or null")]
    InvalidExportTarget { manifest: PathBuf, key: String },

    #[error("{manifest} has a \"{field}\" property that is not a string")]
    InvalidEntryField {
        manifest: PathBuf,
        field: &'static str,
    },

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    #[must_use]
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => codes::FS_ERROR,
            Self::ExportsNotObject { .. } => codes::EXPORTS_NOT_OBJECT,
            Self::InvalidExportKey { .. } => codes::EXPORT_KEY_INVALID,
            Self::InvalidExportTarget { .. } => codes::EXPORT_TARGET_INVALID,
            Self::InvalidEntryField { .. } => codes::ENTRY_FIELD_INVALID,
            Self::ConfigRead { .. } => codes::CONFIG_READ,
            Self::ConfigParse { .. } => codes::CONFIG_PARSE,
        }
    }

    /// True when the error comes from a package's own declarations.
    ///
    /// Such a package cannot be served, but retrying will not help and the
    /// rest of the dependency tree is unaffected.
    #[must_use]
    pub fn is_malformed_package(&self) -> bool {
        matches!(
            self,
            Self::ExportsNotObject { .. }
                | Self::InvalidExportKey { .. }
                | Self::InvalidExportTarget { .. }
                | Self::InvalidEntryField { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
