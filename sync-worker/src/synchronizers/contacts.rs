use super::{custom_properties, owned, search_properties, MappingOutcome, Synchronizer};
use crate::associations::{resolve_batch, AssociationIndex};
use crate::client::models::CrmRecord;
use crate::client::ObjectType;
use crate::error::SyncError;
use crate::paginator::ResourceQuery;
use crate::session::AccountSession;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubsync::action::{Action, ContactProperties, Lifecycle};
use hubsync::Resource;

const PROPERTIES: [&str; 8] = [
    "firstname",
    "lastname",
    "jobtitle",
    "email",
    "hubspotscore",
    "hs_lead_status",
    "hs_analytics_source",
    "hs_latest_source",
];

pub struct ContactsSync {
    extra_properties: Vec<String>,
}

impl ContactsSync {
    pub fn new(extra_properties: Vec<String>) -> Self {
        Self { extra_properties }
    }

    fn map_record(
        &self,
        record: &CrmRecord,
        companies: &AssociationIndex,
        watermark: Option<DateTime<Utc>>,
    ) -> MappingOutcome {
        let email = match record.property("email") {
            Some(email) => email,
            None => return MappingOutcome::Skipped("contact has no email"),
        };

        let lifecycle = Lifecycle::classify(record.created_at, watermark);
        let action_date = lifecycle.action_date(record.created_at, record.updated_at);

        let contact_name = format!(
            "{} {}",
            record.property("firstname").unwrap_or_default(),
            record.property("lastname").unwrap_or_default()
        )
        .trim()
        .to_string();

        let properties = ContactProperties {
            company_id: owned(companies.first(&record.id)),
            contact_name,
            contact_title: owned(record.property("jobtitle")),
            contact_source: owned(record.property("hs_analytics_source")),
            contact_status: owned(record.property("hs_lead_status")),
            contact_score: record.property("hubspotscore").map(parse_score).unwrap_or(0),
            custom: custom_properties(record, &self.extra_properties),
        };

        MappingOutcome::Emit(Action::contact(lifecycle, action_date, email, properties))
    }
}

/// Leading integer of a score value (`"12.5"` → 12); 0 when there is none.
fn parse_score(value: &str) -> i64 {
    let value = value.trim();
    let digits_end = value
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    value[..digits_end].parse().unwrap_or(0)
}

#[async_trait]
impl Synchronizer for ContactsSync {
    fn resource(&self) -> Resource {
        Resource::Contacts
    }

    fn query(&self) -> ResourceQuery {
        ResourceQuery {
            object: ObjectType::Contacts,
            modified_property: "lastmodifieddate",
            properties: search_properties(&PROPERTIES, &self.extra_properties),
        }
    }

    async fn map_page(
        &self,
        session: &mut AccountSession,
        records: Vec<CrmRecord>,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<MappingOutcome>, SyncError> {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let companies =
            resolve_batch(session, &ids, ObjectType::Contacts, ObjectType::Companies).await?;

        Ok(records
            .iter()
            .map(|record| self.map_record(record, &companies, watermark))
            .collect())
    }
}
