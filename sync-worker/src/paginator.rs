//! Date-windowed search pagination.
//!
//! HubSpot search stops serving results past a fixed offset. When the cursor
//! reaches that ceiling the window is rebased: the offset is dropped and the
//! lower bound of the modified-date filter moves up to the last record seen.

use crate::client::models::{
    CrmRecord, Filter, FilterGroup, FilterOperator, SearchRequest, Sort, SortDirection,
};
use crate::client::ObjectType;
use crate::error::SyncError;
use crate::session::AccountSession;
use chrono::{DateTime, Utc};
use hubsync::config::PaginationConfig;
use std::collections::HashSet;
use tracing::{debug, warn};

/// What a synchronizer searches for.
#[derive(Debug, Clone)]
pub struct ResourceQuery {
    pub object: ObjectType,
    /// Property the date window filters and sorts on
    pub modified_property: &'static str,
    pub properties: Vec<String>,
}

/// Position within the current date window. A new value is produced for every
/// page; cursors are never mutated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub after: Option<u64>,
    pub rebase_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStep {
    Continue(PageCursor),
    Rebase(PageCursor),
    Exhausted,
}

impl PageCursor {
    /// Next cursor given the page's `paging.next.after` and the modified
    /// instant of its final record.
    ///
    /// A missing, zero or unparseable `after` means the window is exhausted.
    pub fn advance(
        &self,
        next_after: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
        ceiling: u64,
    ) -> CursorStep {
        let after = match next_after.and_then(|a| a.trim().parse::<u64>().ok()) {
            Some(after) if after > 0 => after,
            _ => return CursorStep::Exhausted,
        };

        if after < ceiling {
            return CursorStep::Continue(PageCursor {
                after: Some(after),
                rebase_date: self.rebase_date,
            });
        }

        match last_modified {
            Some(date) => CursorStep::Rebase(PageCursor {
                after: None,
                rebase_date: Some(date),
            }),
            None => CursorStep::Exhausted,
        }
    }
}

/// One fetched page, with boundary repeats from a previous window removed.
#[derive(Debug)]
pub struct Page {
    pub records: Vec<CrmRecord>,
    /// The window was rebased after this page
    pub rebased: bool,
}

/// Walks every page of a resource modified between the watermark and the
/// run start.
pub struct Paginator<'q> {
    query: &'q ResourceQuery,
    watermark: Option<DateTime<Utc>>,
    run_started: DateTime<Utc>,
    page_size: u32,
    ceiling: u64,
    cursor: PageCursor,
    /// Latest modified instant seen in this window and the ids sharing it
    boundary: Option<(DateTime<Utc>, HashSet<String>)>,
    /// Ids already delivered at the current rebase instant
    repeats: HashSet<String>,
    exhausted: bool,
}

impl<'q> Paginator<'q> {
    pub fn new(
        query: &'q ResourceQuery,
        watermark: Option<DateTime<Utc>>,
        run_started: DateTime<Utc>,
        config: &PaginationConfig,
    ) -> Self {
        Self {
            query,
            watermark,
            run_started,
            page_size: config.page_size,
            ceiling: config.offset_ceiling,
            cursor: PageCursor::default(),
            boundary: None,
            repeats: HashSet::new(),
            exhausted: false,
        }
    }

    fn lower_bound(&self) -> Option<DateTime<Utc>> {
        self.cursor.rebase_date.or(self.watermark)
    }

    /// Search request for the current cursor. Without a lower bound no date
    /// filter is sent and the whole resource is fetched.
    pub fn request(&self) -> SearchRequest {
        let property = self.query.modified_property;
        let filter_groups = match self.lower_bound() {
            Some(lower) => vec![FilterGroup {
                filters: vec![
                    Filter::new(property, FilterOperator::Gte, lower),
                    Filter::new(property, FilterOperator::Lte, self.run_started),
                ],
            }],
            None => Vec::new(),
        };

        SearchRequest {
            filter_groups,
            sorts: vec![Sort {
                property_name: property.to_string(),
                direction: SortDirection::Ascending,
            }],
            properties: self.query.properties.clone(),
            limit: self.page_size,
            after: self.cursor.after.map(|a| a.to_string()),
        }
    }

    /// Fetches the next page, or `None` once the window is exhausted.
    ///
    /// Fails with [`SyncError::PaginationStalled`] when a rebase would not move
    /// the lower bound forward; the records past the ceiling are unreachable.
    pub async fn next_page(
        &mut self,
        session: &mut AccountSession,
    ) -> Result<Option<Page>, SyncError> {
        if self.exhausted {
            return Ok(None);
        }

        let request = self.request();
        let object = self.query.object;
        let operation = format!("search {}", object.path());
        let request_ref = &request;
        let response = session
            .execute(&operation, move |client| async move {
                client.search(object, request_ref).await
            })
            .await?;

        let next_after = response.next_after().map(str::to_string);
        let mut records = response.results;
        if records.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        self.track_boundary(&records);
        let last_modified = records.last().map(|r| r.updated_at);
        if !self.repeats.is_empty() {
            records.retain(|r| !self.repeats.contains(&r.id));
        }

        let mut rebased = false;
        match self
            .cursor
            .advance(next_after.as_deref(), last_modified, self.ceiling)
        {
            CursorStep::Continue(next) => self.cursor = next,
            CursorStep::Exhausted => self.exhausted = true,
            CursorStep::Rebase(next) => {
                let lower_bound = self.lower_bound();
                match next.rebase_date {
                    Some(stalled_at) if Some(stalled_at) <= lower_bound => {
                        warn!(
                            object = object.path(),
                            rebase_date = %stalled_at,
                            "Pagination window did not advance"
                        );
                        self.exhausted = true;
                        return Err(SyncError::PaginationStalled {
                            object: object.path().to_string(),
                            modified_at: stalled_at,
                            ceiling: self.ceiling,
                        });
                    }
                    rebase_date => {
                        self.repeats = match (self.boundary.take(), rebase_date) {
                            (Some((at, ids)), Some(date)) if at == date => ids,
                            _ => HashSet::new(),
                        };
                        debug!(
                            object = object.path(),
                            rebase_date = ?rebase_date,
                            repeats = self.repeats.len(),
                            "Rebasing pagination window"
                        );
                        self.cursor = next;
                        rebased = true;
                    }
                }
            }
        }

        Ok(Some(Page { records, rebased }))
    }

    fn track_boundary(&mut self, records: &[CrmRecord]) {
        for record in records {
            match &mut self.boundary {
                Some((at, ids)) if *at == record.updated_at => {
                    ids.insert(record.id.clone());
                }
                Some((at, _)) if *at > record.updated_at => {}
                slot => *slot = Some((record.updated_at, HashSet::from([record.id.clone()]))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Backoff;
    use crate::refresh::OAuthApp;
    use crate::test_support::{at, record, test_account, MockCrmClient};
    use std::sync::Arc;

    const CEILING: u64 = 9900;

    fn query() -> ResourceQuery {
        ResourceQuery {
            object: ObjectType::Companies,
            modified_property: "hs_lastmodifieddate",
            properties: vec!["domain".to_string()],
        }
    }

    fn session(client: &Arc<MockCrmClient>) -> AccountSession {
        AccountSession::new(
            test_account(),
            client.clone(),
            Arc::new(OAuthApp::new("cid", "secret")),
            Backoff::immediate(0),
        )
    }

    fn config(offset_ceiling: u64) -> PaginationConfig {
        PaginationConfig {
            page_size: 100,
            offset_ceiling,
        }
    }

    fn filter_values(request: &SearchRequest) -> Vec<String> {
        request
            .filter_groups
            .iter()
            .flat_map(|g| g.filters.iter().map(|f| f.value.clone()))
            .collect()
    }

    #[test]
    fn test_advance_continues_below_ceiling() {
        let cursor = PageCursor::default();
        assert_eq!(
            cursor.advance(Some("100"), Some(at(1)), CEILING),
            CursorStep::Continue(PageCursor {
                after: Some(100),
                rebase_date: None,
            })
        );
    }

    #[test]
    fn test_advance_exhausted_without_valid_after() {
        let cursor = PageCursor::default();
        assert_eq!(cursor.advance(None, Some(at(1)), CEILING), CursorStep::Exhausted);
        assert_eq!(cursor.advance(Some("0"), Some(at(1)), CEILING), CursorStep::Exhausted);
        assert_eq!(cursor.advance(Some("abc"), Some(at(1)), CEILING), CursorStep::Exhausted);
    }

    #[test]
    fn test_advance_rebases_at_ceiling() {
        let cursor = PageCursor {
            after: Some(9800),
            rebase_date: None,
        };
        assert_eq!(
            cursor.advance(Some("9900"), Some(at(5)), CEILING),
            CursorStep::Rebase(PageCursor {
                after: None,
                rebase_date: Some(at(5)),
            })
        );
    }

    #[test]
    fn test_advance_keeps_rebase_date() {
        let cursor = PageCursor {
            after: None,
            rebase_date: Some(at(5)),
        };
        assert_eq!(
            cursor.advance(Some("100"), Some(at(6)), CEILING),
            CursorStep::Continue(PageCursor {
                after: Some(100),
                rebase_date: Some(at(5)),
            })
        );
    }

    #[test]
    fn test_request_without_watermark_has_no_filter() {
        let query = query();
        let paginator = Paginator::new(&query, None, at(60), &config(CEILING));
        let request = paginator.request();
        assert!(request.filter_groups.is_empty());
        assert_eq!(request.sorts[0].property_name, "hs_lastmodifieddate");
        assert_eq!(request.limit, 100);
        assert!(request.after.is_none());
    }

    #[test]
    fn test_request_with_watermark_filters_window() {
        let query = query();
        let paginator = Paginator::new(&query, Some(at(0)), at(60), &config(CEILING));
        let request = paginator.request();
        let filters = &request.filter_groups[0].filters;
        assert_eq!(filters[0].operator, FilterOperator::Gte);
        assert_eq!(filters[0].value, at(0).timestamp_millis().to_string());
        assert_eq!(filters[1].operator, FilterOperator::Lte);
        assert_eq!(filters[1].value, at(60).timestamp_millis().to_string());
    }

    #[tokio::test]
    async fn test_empty_first_page_terminates() {
        let client = Arc::new(MockCrmClient::new());
        client.push_page(ObjectType::Companies, vec![], Some("100"));
        let mut session = session(&client);
        let query = query();
        let mut paginator = Paginator::new(&query, None, at(60), &config(CEILING));

        assert!(paginator.next_page(&mut session).await.unwrap().is_none());
        assert!(paginator.next_page(&mut session).await.unwrap().is_none());
        assert_eq!(client.searches(ObjectType::Companies).len(), 1);
    }

    #[tokio::test]
    async fn test_walks_pages_until_exhausted() {
        let client = Arc::new(MockCrmClient::new());
        client.push_page(ObjectType::Companies, vec![record("1", at(1), at(1), &[])], Some("100"));
        client.push_page(ObjectType::Companies, vec![record("2", at(2), at(2), &[])], None);
        let mut session = session(&client);
        let query = query();
        let mut paginator = Paginator::new(&query, Some(at(0)), at(60), &config(CEILING));

        let first = paginator.next_page(&mut session).await.unwrap().unwrap();
        assert_eq!(first.records[0].id, "1");
        let second = paginator.next_page(&mut session).await.unwrap().unwrap();
        assert_eq!(second.records[0].id, "2");
        assert!(paginator.next_page(&mut session).await.unwrap().is_none());

        let searches = client.searches(ObjectType::Companies);
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[1].after.as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn test_rebase_moves_lower_bound_and_drops_repeats() {
        let client = Arc::new(MockCrmClient::new());
        client.push_page(
            ObjectType::Companies,
            vec![record("1", at(1), at(1), &[]), record("2", at(1), at(3), &[])],
            Some("100"),
        );
        client.push_page(
            ObjectType::Companies,
            vec![record("3", at(1), at(4), &[]), record("4", at(1), at(5), &[])],
            Some("200"),
        );
        // Inclusive lower bound returns record 4 again
        client.push_page(
            ObjectType::Companies,
            vec![record("4", at(1), at(5), &[]), record("5", at(1), at(6), &[])],
            None,
        );
        let mut session = session(&client);
        let query = query();
        let mut paginator = Paginator::new(&query, Some(at(0)), at(60), &config(200));

        let mut seen = Vec::new();
        let mut rebases = 0;
        while let Some(page) = paginator.next_page(&mut session).await.unwrap() {
            rebases += page.rebased as u32;
            seen.extend(page.records.into_iter().map(|r| r.id));
        }

        assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(rebases, 1);

        let searches = client.searches(ObjectType::Companies);
        assert_eq!(searches.len(), 3);
        for search in &searches {
            let after: Option<u64> = search.after.as_deref().map(|a| a.parse().unwrap());
            assert!(after.map_or(true, |a| a < 200));
        }
        assert!(searches[2].after.is_none());
        assert_eq!(
            filter_values(&searches[2]),
            vec![
                at(5).timestamp_millis().to_string(),
                at(60).timestamp_millis().to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_stalled_rebase_fails() {
        let client = Arc::new(MockCrmClient::new());
        // Every record on the page shares the watermark instant
        client.push_page(
            ObjectType::Companies,
            vec![record("1", at(0), at(0), &[]), record("2", at(0), at(0), &[])],
            Some("200"),
        );
        let mut session = session(&client);
        let query = query();
        let mut paginator = Paginator::new(&query, Some(at(0)), at(60), &config(200));

        let err = paginator.next_page(&mut session).await.unwrap_err();
        match err {
            SyncError::PaginationStalled {
                object,
                modified_at,
                ceiling,
            } => {
                assert_eq!(object, "companies");
                assert_eq!(modified_at, at(0));
                assert_eq!(ceiling, 200);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(paginator.next_page(&mut session).await.unwrap().is_none());
        assert_eq!(client.searches(ObjectType::Companies).len(), 1);
    }

    #[tokio::test]
    async fn test_search_failure_is_remote_call_failed() {
        let client = Arc::new(MockCrmClient::new());
        client.push_search_error(ObjectType::Companies, "HubSpot API error 502");
        let mut session = session(&client);
        let query = query();
        let mut paginator = Paginator::new(&query, None, at(60), &config(CEILING));

        let err = paginator.next_page(&mut session).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteCallFailed { attempts: 1, .. }));
    }
}
