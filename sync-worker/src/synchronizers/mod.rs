//! Per-resource sync pipelines.
//!
//! Each synchronizer describes what to search for and how to map a page of
//! records to actions; [`run`] drives the shared loop: page through the
//! modified-date window, map, queue, and advance the watermark on success.

mod companies;
mod contacts;
mod meetings;

pub use companies::CompaniesSync;
pub use contacts::ContactsSync;
pub use meetings::MeetingsSync;

use crate::client::models::CrmRecord;
use crate::error::SyncError;
use crate::paginator::{Paginator, ResourceQuery};
use crate::queue::ActionQueue;
use crate::session::AccountSession;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubsync::action::{normalize_property_name, Action, CustomProperties};
use hubsync::config::PaginationConfig;
use hubsync::Resource;
use serde_json::Value;
use tracing::{debug, info};

/// Prefix for configured extra properties in action payloads.
pub const PROPERTY_PREFIX: &str = "hubspot__";

/// Result of mapping one record.
#[derive(Debug)]
pub enum MappingOutcome {
    Emit(Action),
    /// Not an error: the record lacks something the action requires.
    Skipped(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Fetching,
    Mapping,
    Rebasing,
    Done,
}

/// Counters for one synchronizer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages: usize,
    pub emitted: usize,
    pub skipped: usize,
    pub rebases: usize,
}

#[async_trait]
pub trait Synchronizer: Send + Sync {
    fn resource(&self) -> Resource;

    fn query(&self) -> ResourceQuery;

    /// Maps a page of records (all carrying a property map) to outcomes.
    ///
    /// `watermark` is the resource watermark captured before paging began.
    async fn map_page(
        &self,
        session: &mut AccountSession,
        records: Vec<CrmRecord>,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<MappingOutcome>, SyncError>;
}

/// Pages through everything modified since the watermark, queueing one action
/// per mappable record. The watermark moves to the run start only after the
/// window is exhausted; on error it is left untouched.
pub async fn run(
    sync: &dyn Synchronizer,
    session: &mut AccountSession,
    queue: &mut ActionQueue,
    pagination: &PaginationConfig,
) -> Result<SyncReport, SyncError> {
    let resource = sync.resource();
    let run_started = Utc::now();
    let watermark = session.account.watermark(resource);
    let query = sync.query();
    let mut paginator = Paginator::new(&query, watermark, run_started, pagination);
    let mut report = SyncReport::default();

    debug!(
        hub_id = %session.account.hub_id,
        resource = %resource,
        phase = ?SyncPhase::Fetching,
        watermark = ?watermark,
        "Starting sync"
    );

    while let Some(page) = paginator.next_page(session).await? {
        report.pages += 1;

        let (records, unmapped): (Vec<_>, Vec<_>) = page
            .records
            .into_iter()
            .partition(|r| r.properties.is_some());
        report.skipped += unmapped.len();

        debug!(
            hub_id = %session.account.hub_id,
            resource = %resource,
            phase = ?SyncPhase::Mapping,
            records = records.len(),
            "Fetched {} batch",
            resource
        );

        for outcome in sync.map_page(session, records, watermark).await? {
            match outcome {
                MappingOutcome::Emit(action) => {
                    queue.push(action);
                    report.emitted += 1;
                }
                MappingOutcome::Skipped(reason) => {
                    debug!(resource = %resource, reason, "Record skipped");
                    report.skipped += 1;
                }
            }
        }

        if page.rebased {
            report.rebases += 1;
            debug!(
                hub_id = %session.account.hub_id,
                resource = %resource,
                phase = ?SyncPhase::Rebasing,
                "Pagination window rebased"
            );
        }
    }

    session.account.set_watermark(resource, run_started);

    info!(
        domain_id = %session.account.domain_id,
        hub_id = %session.account.hub_id,
        resource = %resource,
        phase = ?SyncPhase::Done,
        pages = report.pages,
        emitted = report.emitted,
        skipped = report.skipped,
        rebases = report.rebases,
        "Sync finished"
    );

    Ok(report)
}

/// Base property list plus configured extras, without duplicates.
fn search_properties(base: &[&str], extra: &[String]) -> Vec<String> {
    let mut properties: Vec<String> = base.iter().map(|p| p.to_string()).collect();
    for name in extra {
        if !properties.contains(name) {
            properties.push(name.clone());
        }
    }
    properties
}

/// Configured extra properties present on `record`, keyed `hubspot__<normalized name>`.
fn custom_properties(record: &CrmRecord, names: &[String]) -> CustomProperties {
    names
        .iter()
        .filter_map(|name| {
            let value = record.property(name)?;
            Some((
                format!("{}{}", PROPERTY_PREFIX, normalize_property_name(name)),
                Value::String(value.to_string()),
            ))
        })
        .collect()
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}
