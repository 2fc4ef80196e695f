//! Package coordinates provided and referenced by uploads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(scheme, name, version)` package coordinate.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageCoordinate {
    pub scheme: String,
    pub name: String,
    pub version: String,
}

impl PackageCoordinate {
    /// Create a coordinate, rejecting empty scheme or name.
    pub fn new(
        scheme: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> crate::Result<Self> {
        let coordinate = Self {
            scheme: scheme.into(),
            name: name.into(),
            version: version.into(),
        };
        if coordinate.scheme.is_empty() || coordinate.name.is_empty() {
            return Err(crate::Error::InvalidCoordinate(coordinate.to_string()));
        }
        Ok(coordinate)
    }
}

impl fmt::Display for PackageCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.scheme, self.name, self.version)
    }
}
