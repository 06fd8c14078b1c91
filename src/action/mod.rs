//! Actions: the normalized Created/Updated events emitted for CRM records.
//!
//! Every action shares one envelope (`actionName`, `actionDate`,
//! `includeInAnalytics`) and carries an entity-typed payload. Payload property
//! maps are normalized with [`filter_null_values`] when serialized, so sinks
//! never see nulls or placeholder strings.
//!
//! ```
//! use hubsync::action::{Action, CompanyProperties, Lifecycle};
//! use chrono::Utc;
//!
//! let action = Action::company(
//!     Lifecycle::Created,
//!     Utc::now(),
//!     CompanyProperties::new("42"),
//! );
//! let record = serde_json::to_value(&action).unwrap();
//! assert_eq!(record["actionName"], "Company Created");
//! assert_eq!(record["companyProperties"]["company_id"], "42");
//! ```

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

mod normalize;

pub use normalize::{filter_null_values, normalize_property_name, DISALLOWED_VALUES};

/// Extra provider properties copied into a payload, keyed by normalized name.
pub type CustomProperties = BTreeMap<String, Value>;

/// Entity an action describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Company,
    Contact,
    Meeting,
}

/// Whether the record is new since the last pull or was modified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Updated,
}

impl Lifecycle {
    /// A record is created if nothing was pulled before, or if it was created
    /// strictly after the watermark.
    pub fn classify(created_at: DateTime<Utc>, watermark: Option<DateTime<Utc>>) -> Self {
        match watermark {
            Some(watermark) if created_at <= watermark => Lifecycle::Updated,
            _ => Lifecycle::Created,
        }
    }

    /// Creation instant for created records, modification instant otherwise.
    pub fn action_date(
        &self,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match self {
            Lifecycle::Created => created_at,
            Lifecycle::Updated => updated_at,
        }
    }
}

/// Action name, serialized as e.g. `"Contact Created"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionName {
    pub entity: EntityKind,
    pub lifecycle: Lifecycle,
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = match self.entity {
            EntityKind::Company => "Company",
            EntityKind::Contact => "Contact",
            EntityKind::Meeting => "Meeting",
        };
        let lifecycle = match self.lifecycle {
            Lifecycle::Created => "Created",
            Lifecycle::Updated => "Updated",
        };
        write!(f, "{} {}", entity, lifecycle)
    }
}

impl Serialize for ActionName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Company-scoped properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CompanyProperties {
    pub company_id: String,
    pub company_domain: Option<String>,
    pub company_industry: Option<String>,
    #[serde(flatten)]
    pub custom: CustomProperties,
}

impl CompanyProperties {
    pub fn new(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            ..Default::default()
        }
    }
}

/// Contact (user) properties. The contact's email travels as the action identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ContactProperties {
    pub company_id: Option<String>,
    pub contact_name: String,
    pub contact_title: Option<String>,
    pub contact_source: Option<String>,
    pub contact_status: Option<String>,
    pub contact_score: i64,
    #[serde(flatten)]
    pub custom: CustomProperties,
}

/// Meeting properties, including resolved attendee emails.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeetingProperties {
    pub meeting_id: String,
    pub meeting_title: Option<String>,
    pub meeting_start_time: Option<DateTime<Utc>>,
    pub meeting_end_time: Option<DateTime<Utc>>,
    pub meeting_created_at: DateTime<Utc>,
    pub meeting_updated_at: DateTime<Utc>,
    pub meeting_contacts: Vec<String>,
    #[serde(flatten)]
    pub custom: CustomProperties,
}

/// Entity-typed payload, flattened into the action record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionPayload {
    Company {
        #[serde(rename = "companyProperties", serialize_with = "normalized")]
        company_properties: CompanyProperties,
    },
    Contact {
        identity: String,
        #[serde(rename = "userProperties", serialize_with = "normalized")]
        user_properties: ContactProperties,
    },
    Meeting {
        #[serde(rename = "meetingProperties", serialize_with = "normalized")]
        meeting_properties: MeetingProperties,
    },
}

/// The unit of work handed to the action sink. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_name: ActionName,
    pub action_date: DateTime<Utc>,
    pub include_in_analytics: u8,
    #[serde(flatten)]
    pub payload: ActionPayload,
}

impl Action {
    pub fn company(
        lifecycle: Lifecycle,
        action_date: DateTime<Utc>,
        properties: CompanyProperties,
    ) -> Self {
        Self::new(
            EntityKind::Company,
            lifecycle,
            action_date,
            ActionPayload::Company {
                company_properties: properties,
            },
        )
    }

    pub fn contact(
        lifecycle: Lifecycle,
        action_date: DateTime<Utc>,
        identity: impl Into<String>,
        properties: ContactProperties,
    ) -> Self {
        Self::new(
            EntityKind::Contact,
            lifecycle,
            action_date,
            ActionPayload::Contact {
                identity: identity.into(),
                user_properties: properties,
            },
        )
    }

    pub fn meeting(
        lifecycle: Lifecycle,
        action_date: DateTime<Utc>,
        properties: MeetingProperties,
    ) -> Self {
        Self::new(
            EntityKind::Meeting,
            lifecycle,
            action_date,
            ActionPayload::Meeting {
                meeting_properties: properties,
            },
        )
    }

    fn new(
        entity: EntityKind,
        lifecycle: Lifecycle,
        action_date: DateTime<Utc>,
        payload: ActionPayload,
    ) -> Self {
        Self {
            action_name: ActionName { entity, lifecycle },
            action_date,
            include_in_analytics: 0,
            payload,
        }
    }
}

/// Serializes a property struct as a JSON object with blank values removed.
fn normalized<T: Serialize, S: Serializer>(
    properties: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let value = serde_json::to_value(properties).map_err(serde::ser::Error::custom)?;
    match value {
        Value::Object(map) => filter_null_values(map).serialize(serializer),
        other => other.serialize(serializer),
    }
}
