use chrono::{DateTime, Utc};
use std::fmt;

/// Engine-level failures.
///
/// Every variant is fatal to the stage that raised them; the orchestrator
/// logs them and moves on to the next stage.
#[derive(Debug)]
pub enum SyncError {
    /// A remote call kept failing after every retry.
    RemoteCallFailed {
        operation: String,
        attempts: u32,
        cause: anyhow::Error,
    },
    /// The refresh credential could not be exchanged for a new access token.
    CredentialRefreshFailed { hub_id: String, cause: anyhow::Error },
    /// More records share one modified instant than the search offset ceiling
    /// can page through, so the date window cannot move forward.
    PaginationStalled {
        object: String,
        modified_at: DateTime<Utc>,
        ceiling: u64,
    },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::RemoteCallFailed {
                operation,
                attempts,
                cause,
            } => write!(
                f,
                "{} failed after {} attempts: {:#}",
                operation, attempts, cause
            ),
            SyncError::CredentialRefreshFailed { hub_id, cause } => {
                write!(f, "Credential refresh failed for hub {}: {:#}", hub_id, cause)
            }
            SyncError::PaginationStalled {
                object,
                modified_at,
                ceiling,
            } => write!(
                f,
                "{} pagination stalled: {} or more records modified at {}",
                object,
                ceiling,
                modified_at.to_rfc3339()
            ),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::RemoteCallFailed { cause, .. } => Some(&**cause),
            SyncError::CredentialRefreshFailed { cause, .. } => Some(&**cause),
            SyncError::PaginationStalled { .. } => None,
        }
    }
}
