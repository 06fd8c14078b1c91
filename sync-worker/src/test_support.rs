//! Scripted CRM client and fixtures for engine tests.

use crate::client::models::{
    AssociationBatchResponse, AssociationResult, BatchReadResponse, CrmRecord, NextPage,
    ObjectRef, Paging, SearchRequest, SearchResponse, TokenResponse,
};
use crate::client::{CrmClient, ObjectType};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubsync::{Account, Credentials};
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One call observed by [`MockCrmClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Search(ObjectType, SearchRequest),
    Associations(ObjectType, ObjectType, Vec<String>),
    BatchRead(ObjectType, Vec<String>),
    Refresh(String),
}

#[derive(Default)]
struct Script {
    pages: HashMap<ObjectType, VecDeque<Result<SearchResponse>>>,
    associations: HashMap<(ObjectType, ObjectType), HashMap<String, Vec<String>>>,
    emails: HashMap<String, String>,
    tokens: VecDeque<Result<TokenResponse>>,
    /// Remaining injected failures per object type (search, associations from, batch read)
    failures: HashMap<ObjectType, u32>,
    calls: Vec<Call>,
    access_token: String,
}

/// In-memory [`CrmClient`] that serves scripted pages and records every call.
///
/// Searches with no scripted page left return an empty last page.
#[derive(Default)]
pub struct MockCrmClient {
    script: Mutex<Script>,
}

impl MockCrmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one search page for `object`; `after` is the `paging.next.after` value.
    pub fn push_page(&self, object: ObjectType, records: Vec<CrmRecord>, after: Option<&str>) {
        let response = SearchResponse {
            results: records,
            paging: after.map(|a| Paging {
                next: Some(NextPage {
                    after: Some(a.to_string()),
                }),
            }),
        };
        self.lock().pages.entry(object).or_default().push_back(Ok(response));
    }

    /// Queues a failing search for `object`.
    pub fn push_search_error(&self, object: ObjectType, message: &str) {
        self.lock()
            .pages
            .entry(object)
            .or_default()
            .push_back(Err(anyhow!(message.to_string())));
    }

    pub fn associate(&self, from: ObjectType, to: ObjectType, source: &str, targets: &[&str]) {
        self.lock()
            .associations
            .entry((from, to))
            .or_default()
            .insert(
                source.to_string(),
                targets.iter().map(|t| t.to_string()).collect(),
            );
    }

    pub fn set_email(&self, contact_id: &str, email: &str) {
        self.lock()
            .emails
            .insert(contact_id.to_string(), email.to_string());
    }

    pub fn push_token(&self, response: Result<TokenResponse>) {
        self.lock().tokens.push_back(response);
    }

    /// Makes the next `times` association and batch reads touching `object` fail.
    pub fn fail_reads(&self, object: ObjectType, times: u32) {
        self.lock().failures.insert(object, times);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn searches(&self, object: ObjectType) -> Vec<SearchRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Search(o, request) if o == object => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn batch_reads(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::BatchRead(_, ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn refresh_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Refresh(token) => Some(token),
                _ => None,
            })
            .collect()
    }

    pub fn current_token(&self) -> String {
        self.lock().access_token.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    fn take_failure(script: &mut Script, object: ObjectType) -> bool {
        match script.failures.get_mut(&object) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl CrmClient for MockCrmClient {
    async fn search(&self, object: ObjectType, request: &SearchRequest) -> Result<SearchResponse> {
        let mut script = self.lock();
        script.calls.push(Call::Search(object, request.clone()));
        script
            .pages
            .get_mut(&object)
            .and_then(|pages| pages.pop_front())
            .unwrap_or_else(|| Ok(SearchResponse::default()))
    }

    async fn read_associations(
        &self,
        from: ObjectType,
        to: ObjectType,
        ids: &[String],
    ) -> Result<AssociationBatchResponse> {
        let mut script = self.lock();
        script
            .calls
            .push(Call::Associations(from, to, ids.to_vec()));
        if Self::take_failure(&mut script, from) {
            return Err(anyhow!("association read failed"));
        }

        let index = script.associations.get(&(from, to));
        let results = ids
            .iter()
            .filter_map(|id| {
                let targets = index?.get(id)?;
                Some(AssociationResult {
                    from: Some(ObjectRef::new(id.clone())),
                    to: targets.iter().map(|t| ObjectRef::new(t.clone())).collect(),
                })
            })
            .collect();
        Ok(AssociationBatchResponse { results })
    }

    async fn batch_read(
        &self,
        object: ObjectType,
        ids: &[String],
        _properties: &[&str],
    ) -> Result<BatchReadResponse> {
        let mut script = self.lock();
        script.calls.push(Call::BatchRead(object, ids.to_vec()));
        if Self::take_failure(&mut script, object) {
            return Err(anyhow!("batch read failed"));
        }

        let results = ids
            .iter()
            .filter_map(|id| {
                let email = script.emails.get(id)?;
                Some(record(id, at(0), at(0), &[("email", email.as_str())]))
            })
            .collect();
        Ok(BatchReadResponse { results })
    }

    async fn refresh_access_token(
        &self,
        _client_id: &str,
        _client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let mut script = self.lock();
        script.calls.push(Call::Refresh(refresh_token.to_string()));
        script
            .tokens
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no token response scripted")))
    }

    async fn api_request(&self, method: Method, path: &str, _body: Option<Value>) -> Result<Value> {
        Err(anyhow!("unscripted request: {} {}", method, path))
    }

    fn set_access_token(&self, token: &str) {
        self.lock().access_token = token.to_string();
    }
}

/// Fixed instant `minutes` after 2024-01-01T00:00:00Z.
pub fn at(minutes: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + chrono::Duration::minutes(minutes)
}

pub fn record(
    id: &str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    properties: &[(&str, &str)],
) -> CrmRecord {
    CrmRecord {
        id: id.to_string(),
        created_at,
        updated_at,
        properties: Some(
            properties
                .iter()
                .map(|(k, v)| (k.to_string(), Some(v.to_string())))
                .collect(),
        ),
    }
}

pub fn test_account() -> Account {
    Account::new(
        "domain-1",
        "1001",
        Credentials {
            access_token: "access-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            expires_at: None,
        },
    )
}
