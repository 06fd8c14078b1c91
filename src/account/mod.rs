//! Connected HubSpot accounts and their per-resource watermarks.

use crate::credentials::Credentials;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

mod store;

pub use store::SqliteAccountStore;

/// A resource synchronized from the CRM, each with its own watermark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Companies,
    Contacts,
    Meetings,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Companies, Resource::Contacts, Resource::Meetings];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Companies => "companies",
            Resource::Contacts => "contacts",
            Resource::Meetings => "meetings",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One connected tenant portal.
///
/// Owned by the orchestrator for the duration of a run. Credentials are
/// mutated by token refresh, watermarks by the synchronizer for that resource.
#[derive(Clone, Debug)]
pub struct Account {
    /// Owning tenant key (log context)
    pub domain_id: String,
    /// HubSpot portal id
    pub hub_id: String,
    pub credentials: Credentials,
    /// Last successful pull per resource
    pub last_pulled: BTreeMap<Resource, DateTime<Utc>>,
}

impl Account {
    pub fn new(
        domain_id: impl Into<String>,
        hub_id: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            domain_id: domain_id.into(),
            hub_id: hub_id.into(),
            credentials,
            last_pulled: BTreeMap::new(),
        }
    }

    /// Watermark for `resource`, `None` before the first successful pull.
    pub fn watermark(&self, resource: Resource) -> Option<DateTime<Utc>> {
        self.last_pulled.get(&resource).copied()
    }

    pub fn set_watermark(&mut self, resource: Resource, pulled_at: DateTime<Utc>) {
        self.last_pulled.insert(resource, pulled_at);
    }
}

/// Source of accounts to synchronize and sink for their updated state.
pub trait AccountStore: Send + Sync {
    /// Returns every connected account.
    fn find_accounts(&self) -> Result<Vec<Account>>;

    /// Writes back credentials and watermarks for one account.
    fn persist(&self, account: &Account) -> Result<()>;
}
