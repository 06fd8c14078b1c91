//! HubSpot Sync Worker - incremental CRM sync engine.
//!
//! Pulls companies, contacts and meetings modified since each account's last
//! successful pull and turns them into Created/Updated actions.
//!
//! # Architecture
//!
//! ```text
//!   AccountStore ──▶ Orchestrator ──▶ per account:
//!                        │
//!                        ├─ refresh credentials
//!                        ├─ Companies ─┐
//!                        ├─ Contacts  ─┼─▶ Paginator ─▶ CrmClient (with backoff)
//!                        ├─ Meetings  ─┘      │
//!                        │                    └─▶ ActionQueue ─▶ ActionSink
//!                        ├─ drain queue
//!                        └─ persist watermarks
//! ```

pub mod associations;
pub mod backoff;
pub mod client;
pub mod error;
pub mod orchestrator;
pub mod paginator;
pub mod queue;
pub mod refresh;
pub mod session;
pub mod synchronizers;

#[cfg(test)]
mod test_support;

pub use backoff::Backoff;
pub use client::{CrmClient, HubSpotClient};
pub use error::SyncError;
pub use orchestrator::{Orchestrator, RunSummary};
pub use refresh::OAuthApp;
pub use session::AccountSession;
