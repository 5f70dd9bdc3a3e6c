//! Package identities (`name@version`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identity of an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    /// Create an identity. Returns `None` if either part is empty.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let version = version.into();
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self { name, version })
    }

    /// Parse `name@version`, including scoped names like `@scope/pkg@1.0.0`.
    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        let (name, version) = id.rsplit_once('@')?;
        Self::new(name, version)
    }

    /// The `name@version` map key.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}
