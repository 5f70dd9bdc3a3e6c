//! `package.json` access.

use crate::error::{Error, Result};
use crate::fs::{absent_as_none, PackageFs};
use crate::identity::PackageId;
use serde_json::{Map, Value};
use std::io;
use std::path::Path;
use tracing::debug;

/// Manifest file name.
pub const PACKAGE_JSON: &str = "package.json";

/// Install directory name.
pub const NODE_MODULES: &str = "node_modules";

/// Prefix marking a scope directory inside `node_modules`.
pub const SCOPE_PREFIX: char = '@';

/// Entries of `node_modules` that are never packages.
pub const NON_PACKAGE_ENTRIES: &[&str] = &[".bin", ".cache"];

/// A parsed manifest. Only JSON objects are manifests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    fields: Map<String, Value>,
}

impl Manifest {
    /// Parse manifest source. Invalid JSON and non-object documents yield `None`.
    #[must_use]
    pub fn parse(source: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(source).ok()? {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A string field, treating empty strings as missing.
    #[must_use]
    pub fn non_empty_str(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// `name@version`, when both are non-empty strings.
    #[must_use]
    pub fn identity(&self) -> Option<PackageId> {
        PackageId::new(self.non_empty_str("name")?, self.non_empty_str("version")?)
    }
}

/// Read and parse `dir/package.json`.
///
/// A missing file, undecodable bytes or a document that is not a JSON object
/// all yield `Ok(None)`; only system errors are returned.
pub(crate) async fn load<F: PackageFs>(fs: &F, dir: &Path) -> Result<Option<Manifest>> {
    let path = dir.join(PACKAGE_JSON);
    let source = match absent_as_none(fs.read_to_string(&path).await) {
        Ok(Some(source)) => source,
        Ok(None) => return Ok(None),
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            debug!(manifest = %path.display(), "Skipping manifest that is not UTF-8");
            return Ok(None);
        }
        Err(err) => return Err(Error::io("read_file", &path, err)),
    };
    let manifest = Manifest::parse(&source);
    if manifest.is_none() {
        debug!(manifest = %path.display(), "Skipping manifest that is not a JSON object");
    }
    Ok(manifest)
}
