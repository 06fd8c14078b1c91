use crate::backoff::Backoff;
use crate::client::CrmClient;
use crate::refresh::OAuthApp;
use hubsync::Account;
use std::sync::Arc;

/// Exclusive working state for one account during a run.
///
/// The session owns the account (credentials and watermarks) so refreshes and
/// watermark updates need no locking. The CRM client is shared across
/// sessions; its bearer token is switched to this account's on creation.
pub struct AccountSession {
    pub account: Account,
    client: Arc<dyn CrmClient>,
    app: Arc<OAuthApp>,
    backoff: Backoff,
}

impl AccountSession {
    pub fn new(
        account: Account,
        client: Arc<dyn CrmClient>,
        app: Arc<OAuthApp>,
        backoff: Backoff,
    ) -> Self {
        client.set_access_token(&account.credentials.access_token);
        Self {
            account,
            client,
            app,
            backoff,
        }
    }

    /// Shared handle to the CRM client.
    pub fn client(&self) -> Arc<dyn CrmClient> {
        Arc::clone(&self.client)
    }

    pub(crate) fn app(&self) -> &OAuthApp {
        &self.app
    }

    pub(crate) fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Ends the session, handing back the (possibly updated) account.
    pub fn into_account(self) -> Account {
        self.account
    }
}
