use super::{custom_properties, owned, search_properties, MappingOutcome, Synchronizer};
use crate::client::models::CrmRecord;
use crate::client::ObjectType;
use crate::error::SyncError;
use crate::paginator::ResourceQuery;
use crate::session::AccountSession;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hubsync::action::{Action, CompanyProperties, Lifecycle};
use hubsync::Resource;

const PROPERTIES: [&str; 8] = [
    "name",
    "domain",
    "country",
    "industry",
    "description",
    "annualrevenue",
    "numberofemployees",
    "hs_lead_status",
];

/// Company action dates are reported this far before the source instant.
const ACTION_DATE_SHIFT: i64 = 2;

pub struct CompaniesSync {
    extra_properties: Vec<String>,
}

impl CompaniesSync {
    pub fn new(extra_properties: Vec<String>) -> Self {
        Self { extra_properties }
    }

    fn map_record(&self, record: &CrmRecord, watermark: Option<DateTime<Utc>>) -> MappingOutcome {
        let lifecycle = Lifecycle::classify(record.created_at, watermark);
        let action_date = lifecycle.action_date(record.created_at, record.updated_at)
            - Duration::seconds(ACTION_DATE_SHIFT);

        let properties = CompanyProperties {
            company_id: record.id.clone(),
            company_domain: owned(record.property("domain")),
            company_industry: owned(record.property("industry")),
            custom: custom_properties(record, &self.extra_properties),
        };

        MappingOutcome::Emit(Action::company(lifecycle, action_date, properties))
    }
}

#[async_trait]
impl Synchronizer for CompaniesSync {
    fn resource(&self) -> Resource {
        Resource::Companies
    }

    fn query(&self) -> ResourceQuery {
        ResourceQuery {
            object: ObjectType::Companies,
            modified_property: "hs_lastmodifieddate",
            properties: search_properties(&PROPERTIES, &self.extra_properties),
        }
    }

    async fn map_page(
        &self,
        _session: &mut AccountSession,
        records: Vec<CrmRecord>,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<MappingOutcome>, SyncError> {
        Ok(records
            .iter()
            .map(|record| self.map_record(record, watermark))
            .collect())
    }
}
