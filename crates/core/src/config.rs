//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        /// Used as the busy timeout while waiting on the database lock.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600) // 10 minutes
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/codeintel.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite {
                path,
                query_timeout_secs,
            } => {
                if path.as_os_str().is_empty() {
                    return Err("metadata.path cannot be empty".to_string());
                }
                if query_timeout_secs == &Some(0) {
                    return Err("metadata.query_timeout_secs cannot be 0".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Reference-count engine configuration.
///
/// `disabled` is an incident escape hatch: every engine invocation and every
/// expired-upload reclaim becomes a logged no-op, and reference counts drift
/// until it is turned back off.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceCountConfig {
    #[serde(default)]
    pub disabled: bool,
}

/// Background janitor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Seconds between janitor passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Uploads still `uploading` after this many seconds are reaped.
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// Uploads of a deleted repository are purged once it has been gone this long.
    #[serde(default = "default_deleted_repository_grace_period_secs")]
    pub deleted_repository_grace_period_secs: u64,
    /// Minimum seconds between two retention scans of one repository.
    #[serde(default = "default_retention_process_delay_secs")]
    pub retention_process_delay_secs: u64,
    /// Repositories selected per retention scan.
    #[serde(default = "default_retention_batch_size")]
    pub retention_batch_size: u32,
    /// Completed uploads older than this (and not visible at tip) are expired.
    #[serde(default = "default_max_upload_age_secs")]
    pub max_upload_age_secs: u64,
    /// `deleting` uploads hard-deleted per pass.
    #[serde(default = "default_hard_delete_batch_size")]
    pub hard_delete_batch_size: u32,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_upload_timeout_secs() -> u64 {
    86400 // 24 hours
}

fn default_deleted_repository_grace_period_secs() -> u64 {
    1800 // 30 minutes
}

fn default_retention_process_delay_secs() -> u64 {
    86400 // 24 hours
}

fn default_retention_batch_size() -> u32 {
    100
}

fn default_max_upload_age_secs() -> u64 {
    30 * 86400 // 30 days
}

fn default_hard_delete_batch_size() -> u32 {
    100
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            deleted_repository_grace_period_secs: default_deleted_repository_grace_period_secs(),
            retention_process_delay_secs: default_retention_process_delay_secs(),
            retention_batch_size: default_retention_batch_size(),
            max_upload_age_secs: default_max_upload_age_secs(),
            hard_delete_batch_size: default_hard_delete_batch_size(),
        }
    }
}

fn seconds(secs: u64) -> Duration {
    // Saturate at i64::MAX to prevent overflow wrapping to negative
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

impl JanitorConfig {
    /// Get the pass interval as a std::time::Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        seconds(self.upload_timeout_secs)
    }

    pub fn deleted_repository_grace_period(&self) -> Duration {
        seconds(self.deleted_repository_grace_period_secs)
    }

    pub fn retention_process_delay(&self) -> Duration {
        seconds(self.retention_process_delay_secs)
    }

    pub fn max_upload_age(&self) -> Duration {
        seconds(self.max_upload_age_secs)
    }

    /// Validate janitor configuration for settings that would fail at runtime.
    pub fn validate(&self) -> Result<(), String> {
        // tokio::time::interval panics on a zero period
        if self.interval_secs == 0 {
            return Err("janitor.interval_secs cannot be 0".to_string());
        }

        for (name, value) in [
            ("upload_timeout_secs", self.upload_timeout_secs),
            (
                "deleted_repository_grace_period_secs",
                self.deleted_repository_grace_period_secs,
            ),
            (
                "retention_process_delay_secs",
                self.retention_process_delay_secs,
            ),
            ("max_upload_age_secs", self.max_upload_age_secs),
        ] {
            if value > i64::MAX as u64 {
                return Err(format!(
                    "janitor.{name} {value} exceeds maximum value {}",
                    i64::MAX
                ));
            }
        }

        if self.retention_batch_size == 0 {
            return Err("janitor.retention_batch_size must be at least 1".to_string());
        }
        if self.hard_delete_batch_size == 0 {
            return Err("janitor.hard_delete_batch_size must be at least 1".to_string());
        }

        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Reference-count engine configuration.
    #[serde(default)]
    pub reference_counts: ReferenceCountConfig,
    /// Background janitor configuration.
    #[serde(default)]
    pub janitor: JanitorConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.metadata.validate().map_err(crate::Error::Config)?;
        self.janitor.validate().map_err(crate::Error::Config)?;
        Ok(())
    }
}
