use super::{custom_properties, owned, search_properties, MappingOutcome, Synchronizer};
use crate::associations::MeetingAttendees;
use crate::client::models::CrmRecord;
use crate::client::ObjectType;
use crate::error::SyncError;
use crate::paginator::ResourceQuery;
use crate::session::AccountSession;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hubsync::action::{Action, Lifecycle, MeetingProperties};
use hubsync::Resource;

const PROPERTIES: [&str; 3] = ["hs_meeting_title", "hs_meeting_start_time", "hs_meeting_end_time"];

pub struct MeetingsSync {
    extra_properties: Vec<String>,
}

impl MeetingsSync {
    pub fn new(extra_properties: Vec<String>) -> Self {
        Self { extra_properties }
    }

    fn map_record(
        &self,
        record: &CrmRecord,
        attendees: &MeetingAttendees,
        watermark: Option<DateTime<Utc>>,
    ) -> MappingOutcome {
        // Newly created meetings can report differing created/updated instants,
        // so creation is judged against the watermark alone.
        let lifecycle = Lifecycle::classify(record.created_at, watermark);
        let action_date = lifecycle.action_date(record.created_at, record.updated_at);

        let properties = MeetingProperties {
            meeting_id: record.id.clone(),
            meeting_title: owned(record.property("hs_meeting_title")),
            meeting_start_time: record.property("hs_meeting_start_time").and_then(parse_instant),
            meeting_end_time: record.property("hs_meeting_end_time").and_then(parse_instant),
            meeting_created_at: record.created_at,
            meeting_updated_at: record.updated_at,
            meeting_contacts: attendees.emails_for(&record.id),
            custom: custom_properties(record, &self.extra_properties),
        };

        MappingOutcome::Emit(Action::meeting(lifecycle, action_date, properties))
    }
}

/// Meeting times arrive as RFC 3339 strings or epoch milliseconds.
fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let millis = value.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

#[async_trait]
impl Synchronizer for MeetingsSync {
    fn resource(&self) -> Resource {
        Resource::Meetings
    }

    fn query(&self) -> ResourceQuery {
        ResourceQuery {
            object: ObjectType::Meetings,
            modified_property: "hs_lastmodifieddate",
            properties: search_properties(&PROPERTIES, &self.extra_properties),
        }
    }

    async fn map_page(
        &self,
        session: &mut AccountSession,
        records: Vec<CrmRecord>,
        _watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<MappingOutcome>, SyncError> {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let attendees = MeetingAttendees::resolve(session, &ids).await?;

        // Re-read on every page rather than using the value captured at start
        let watermark = session.account.watermark(Resource::Meetings);

        Ok(records
            .iter()
            .map(|record| self.map_record(record, &attendees, watermark))
            .collect())
    }
}
