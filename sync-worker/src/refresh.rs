//! OAuth access-token refresh for an account session.

use crate::error::SyncError;
use crate::session::AccountSession;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

/// Process-level OAuth app credentials used for every token exchange.
#[derive(Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthApp")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl OAuthApp {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads `HUBSPOT_CID` and `HUBSPOT_CS`.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("HUBSPOT_CID").context("HUBSPOT_CID is required")?;
        let client_secret = std::env::var("HUBSPOT_CS").context("HUBSPOT_CS is required")?;
        Ok(Self::new(client_id, client_secret))
    }
}

impl AccountSession {
    /// Exchanges the stored refresh token for a new access token.
    ///
    /// On success the account's credentials and expiry are updated in memory
    /// and the shared client starts using the new token. Failures are not
    /// retried; the credentials are left unchanged.
    pub async fn refresh_credentials(&mut self) -> Result<(), SyncError> {
        let hub_id = self.account.hub_id.clone();
        let refresh_token = self
            .account
            .credentials
            .refresh_token
            .clone()
            .ok_or_else(|| SyncError::CredentialRefreshFailed {
                hub_id: hub_id.clone(),
                cause: anyhow!("no refresh token stored"),
            })?;

        info!(
            domain_id = %self.account.domain_id,
            hub_id = %hub_id,
            "Refreshing OAuth token"
        );

        let app = self.app().clone();
        let token = self
            .client()
            .refresh_access_token(&app.client_id, &app.client_secret, &refresh_token)
            .await
            .map_err(|cause| SyncError::CredentialRefreshFailed {
                hub_id: hub_id.clone(),
                cause,
            })?;

        let expires_at = token
            .expires_in
            .map(|secs| {
                expiry_after(secs).ok_or_else(|| SyncError::CredentialRefreshFailed {
                    hub_id: hub_id.clone(),
                    cause: anyhow!("token lifetime out of range: {}s", secs),
                })
            })
            .transpose()?;

        {
            let credentials = &mut self.account.credentials;
            if token.access_token != credentials.access_token {
                credentials.access_token = token.access_token;
            }
            // Keep the existing refresh token if the provider did not rotate it
            if let Some(rotated) = token.refresh_token {
                credentials.refresh_token = Some(rotated);
            }
            credentials.expires_at = expires_at;
        }

        self.client()
            .set_access_token(&self.account.credentials.access_token);

        info!(
            domain_id = %self.account.domain_id,
            hub_id = %hub_id,
            "OAuth token refreshed successfully"
        );

        Ok(())
    }
}

/// Instant `secs` seconds from now, `None` if it cannot be represented.
fn expiry_after(secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}
