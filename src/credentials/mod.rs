//! OAuth credentials for a connected HubSpot portal.
//!
//! Tokens live in memory as plain strings for the duration of a run and are
//! encrypted with [`TokenCipher`] whenever they are written to the account store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod encryption;

pub use encryption::{SealedToken, TokenCipher};

/// Credentials for calling the HubSpot API on behalf of one portal.
///
/// The expiry instant is tracked here rather than in process-wide state so
/// that refreshes for one account can never affect another.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token (exchanged for new access tokens)
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Returns true once `now` is past the tracked expiry.
    ///
    /// An unknown expiry (the token was never refreshed during this process)
    /// is not considered expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }
}
