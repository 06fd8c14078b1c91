//! HubSpot CRM v3 request and response shapes, limited to the fields the
//! synchronizers consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CRM object types the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Companies,
    Contacts,
    Meetings,
}

impl ObjectType {
    /// Path segment under `/crm/v3/objects/`.
    pub fn path(&self) -> &'static str {
        match self {
            ObjectType::Companies => "companies",
            ObjectType::Contacts => "contacts",
            ObjectType::Meetings => "meetings",
        }
    }

    /// Name used by the v3 associations API (`/crm/v3/associations/{FROM}/{TO}`).
    pub fn association_name(&self) -> &'static str {
        match self {
            ObjectType::Companies => "COMPANIES",
            ObjectType::Contacts => "CONTACTS",
            ObjectType::Meetings => "MEETINGS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    pub sorts: Vec<Sort>,
    pub properties: Vec<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOperator {
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: FilterOperator,
    /// Epoch milliseconds, as a string
    pub value: String,
}

impl Filter {
    pub fn new(property_name: &str, operator: FilterOperator, at: DateTime<Utc>) -> Self {
        Self {
            property_name: property_name.to_string(),
            operator,
            value: at.timestamp_millis().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Ascending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub property_name: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<CrmRecord>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl SearchResponse {
    /// Raw `paging.next.after` value, if the provider sent one.
    pub fn next_after(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .and_then(|n| n.after.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<NextPage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NextPage {
    #[serde(default)]
    pub after: Option<String>,
}

/// One CRM object as returned by search and batch read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub properties: Option<HashMap<String, Option<String>>>,
}

impl CrmRecord {
    /// Property value; absent, null and empty values all read as `None`.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .as_ref()?
            .get(name)?
            .as_deref()
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssociationBatchRequest {
    pub inputs: Vec<ObjectRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssociationBatchResponse {
    #[serde(default)]
    pub results: Vec<AssociationResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationResult {
    #[serde(default)]
    pub from: Option<ObjectRef>,
    #[serde(default)]
    pub to: Vec<ObjectRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReadRequest {
    pub inputs: Vec<ObjectRef>,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchReadResponse {
    #[serde(default)]
    pub results: Vec<CrmRecord>,
}

/// OAuth token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_search_request_wire_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = SearchRequest {
            filter_groups: vec![FilterGroup {
                filters: vec![Filter::new("hs_lastmodifieddate", FilterOperator::Gte, at)],
            }],
            sorts: vec![Sort {
                property_name: "hs_lastmodifieddate".to_string(),
                direction: SortDirection::Ascending,
            }],
            properties: vec!["domain".to_string()],
            limit: 100,
            after: None,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "filterGroups": [{
                    "filters": [{
                        "propertyName": "hs_lastmodifieddate",
                        "operator": "GTE",
                        "value": "1704067200000"
                    }]
                }],
                "sorts": [{ "propertyName": "hs_lastmodifieddate", "direction": "ASCENDING" }],
                "properties": ["domain"],
                "limit": 100
            })
        );
    }

    #[test]
    fn test_search_response_paging() {
        let response: SearchResponse = serde_json::from_value(json!({
            "total": 1,
            "results": [{
                "id": "1",
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-02T00:00:00.123Z",
                "properties": { "domain": "example.com", "industry": null, "name": "" }
            }],
            "paging": { "next": { "after": "100", "link": "ignored" } }
        }))
        .unwrap();

        assert_eq!(response.next_after(), Some("100"));
        let record = &response.results[0];
        assert_eq!(record.property("domain"), Some("example.com"));
        assert_eq!(record.property("industry"), None);
        assert_eq!(record.property("name"), None);
        assert_eq!(record.property("missing"), None);
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let response: SearchResponse = serde_json::from_value(json!({ "results": [] })).unwrap();
        assert!(response.next_after().is_none());
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_association_result_without_match() {
        let response: AssociationBatchResponse = serde_json::from_value(json!({
            "status": "COMPLETE",
            "results": [
                { "from": { "id": "1" }, "to": [{ "id": "9", "type": "contact_to_company" }] },
                { "from": { "id": "2" } }
            ]
        }))
        .unwrap();

        assert_eq!(response.results[0].to, vec![ObjectRef::new("9")]);
        assert!(response.results[1].to.is_empty());
    }
}
