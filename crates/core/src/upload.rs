//! Upload record states and lifecycle transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Commit date recorded for uploads whose commit could not be resolved.
///
/// Sorts before every real commit date, so such uploads win canonical ranking
/// but are ignored when computing the oldest commit date of a repository.
pub const UNKNOWN_COMMIT_DATE: OffsetDateTime = OffsetDateTime::UNIX_EPOCH;

/// Upload record state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Parts are still being received.
    Uploading,
    /// Fully received, waiting for a worker.
    Queued,
    /// Claimed by a worker.
    Processing,
    /// Processed successfully; may provide packages to other uploads.
    Completed,
    /// Processing hit a retriable error.
    Errored,
    /// Processing failed.
    Failed,
    /// Soft-deleted while completed; awaiting dependency cleanup.
    Deleting,
    /// Soft-deleted; hidden from normal queries until hard-deleted.
    Deleted,
}

impl UploadState {
    pub const ALL: [UploadState; 8] = [
        Self::Uploading,
        Self::Queued,
        Self::Processing,
        Self::Completed,
        Self::Errored,
        Self::Failed,
        Self::Deleting,
        Self::Deleted,
    ];

    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "uploading" => Ok(Self::Uploading),
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "errored" => Ok(Self::Errored),
            "failed" => Ok(Self::Failed),
            "deleting" => Ok(Self::Deleting),
            "deleted" => Ok(Self::Deleted),
            _ => Err(crate::Error::InvalidState(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }

    /// State a soft delete moves this record into.
    ///
    /// Completed uploads may still be canonical providers, so they pass through
    /// `deleting` first. Everything else goes straight to `deleted`.
    pub fn soft_delete_target(&self) -> Option<Self> {
        match self {
            Self::Completed => Some(Self::Deleting),
            Self::Deleting | Self::Deleted => None,
            _ => Some(Self::Deleted),
        }
    }

    /// States from which a transition into `self` is legal for this component.
    ///
    /// Re-queueing a failed upload belongs to an external retry policy and is
    /// not listed here.
    pub fn sources(&self) -> &'static [UploadState] {
        match self {
            Self::Uploading => &[],
            Self::Queued => &[Self::Uploading],
            Self::Processing => &[Self::Queued],
            Self::Completed => &[Self::Processing],
            Self::Errored => &[Self::Processing],
            Self::Failed => &[Self::Uploading, Self::Queued, Self::Processing],
            Self::Deleting => &[Self::Completed],
            Self::Deleted => &[
                Self::Uploading,
                Self::Queued,
                Self::Processing,
                Self::Completed,
                Self::Errored,
                Self::Failed,
                Self::Deleting,
            ],
        }
    }

    /// Check whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        next.sources().contains(self)
    }

    /// Validate `self -> next`, returning a transition error otherwise.
    pub fn transition_to(&self, next: UploadState) -> crate::Result<UploadState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State filter used when listing uploads.
///
/// `errored` and `failed` are one logical group: filtering by either matches both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateFilter(UploadState);

impl StateFilter {
    /// Parse a user-supplied state name.
    pub fn parse(s: &str) -> crate::Result<Self> {
        UploadState::parse(&s.to_ascii_lowercase()).map(Self)
    }

    /// The concrete states this filter matches.
    pub fn states(&self) -> Vec<UploadState> {
        match self.0 {
            UploadState::Errored | UploadState::Failed => {
                vec![UploadState::Errored, UploadState::Failed]
            }
            state => vec![state],
        }
    }
}

impl From<UploadState> for StateFilter {
    fn from(state: UploadState) -> Self {
        Self(state)
    }
}
