//! Background scan kinds throttled per repository.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of periodic per-repository scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// Discovery of new index jobs; every live repository is a candidate.
    IndexScan,
    /// Data retention; repositories with completed uploads and a settled commit graph.
    RetentionScan,
}

impl ScanKind {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "index_scan" => Ok(Self::IndexScan),
            "retention_scan" => Ok(Self::RetentionScan),
            _ => Err(crate::Error::InvalidScanKind(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndexScan => "index_scan",
            Self::RetentionScan => "retention_scan",
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
