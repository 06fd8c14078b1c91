//! Batch resolution of cross-object associations.

use crate::client::ObjectType;
use crate::error::SyncError;
use crate::session::AccountSession;
use std::collections::{BTreeSet, HashMap};

/// Provider limit for ids per batch read.
pub const BATCH_LIMIT: usize = 100;

/// Source id → associated target ids, for one page of records.
#[derive(Debug, Clone, Default)]
pub struct AssociationIndex {
    targets: HashMap<String, Vec<String>>,
}

impl AssociationIndex {
    /// First associated target, if any.
    pub fn first(&self, source: &str) -> Option<&str> {
        self.targets.get(source)?.first().map(String::as_str)
    }

    pub fn targets(&self, source: &str) -> &[String] {
        self.targets.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every target id referenced by the index, deduplicated and ordered.
    pub fn unique_targets(&self) -> BTreeSet<String> {
        self.targets.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Reads the associations from `source_ids` (`from` objects) to `to` objects,
/// at most [`BATCH_LIMIT`] ids per call. Sources with no match are simply
/// absent from the index.
pub async fn resolve_batch(
    session: &mut AccountSession,
    source_ids: &[String],
    from: ObjectType,
    to: ObjectType,
) -> Result<AssociationIndex, SyncError> {
    let operation = format!("read {} to {} associations", from.path(), to.path());
    let mut targets: HashMap<String, Vec<String>> = HashMap::new();

    for chunk in source_ids.chunks(BATCH_LIMIT) {
        let response = session
            .execute(&operation, move |client| async move {
                client.read_associations(from, to, chunk).await
            })
            .await?;

        for result in response.results {
            let Some(source) = result.from else { continue };
            if result.to.is_empty() {
                continue;
            }
            targets
                .entry(source.id)
                .or_insert_with(Vec::new)
                .extend(result.to.into_iter().map(|t| t.id));
        }
    }

    Ok(AssociationIndex { targets })
}

/// Looks up the email of each contact id, reading at most [`BATCH_LIMIT`] ids
/// per call. Contacts without an email are left out.
pub async fn resolve_emails(
    session: &mut AccountSession,
    contact_ids: &BTreeSet<String>,
) -> Result<HashMap<String, String>, SyncError> {
    let ids: Vec<String> = contact_ids.iter().cloned().collect();
    let mut emails = HashMap::new();

    for chunk in ids.chunks(BATCH_LIMIT) {
        let response = session
            .execute("read contact emails", move |client| async move {
                client
                    .batch_read(ObjectType::Contacts, chunk, &["email"])
                    .await
            })
            .await?;

        for record in response.results {
            if let Some(email) = record.property("email") {
                emails.insert(record.id.clone(), email.to_string());
            }
        }
    }

    Ok(emails)
}

/// Attendee emails for a page of meetings.
#[derive(Debug, Default)]
pub struct MeetingAttendees {
    contacts: AssociationIndex,
    emails: HashMap<String, String>,
}

impl MeetingAttendees {
    /// Resolves meeting → contacts, then contacts → email for the
    /// deduplicated set of contacts the page references.
    pub async fn resolve(
        session: &mut AccountSession,
        meeting_ids: &[String],
    ) -> Result<Self, SyncError> {
        let contacts =
            resolve_batch(session, meeting_ids, ObjectType::Meetings, ObjectType::Contacts).await?;
        let emails = resolve_emails(session, &contacts.unique_targets()).await?;
        Ok(Self { contacts, emails })
    }

    /// Emails of the meeting's attendees; contacts without an email are skipped.
    pub fn emails_for(&self, meeting_id: &str) -> Vec<String> {
        self.contacts
            .targets(meeting_id)
            .iter()
            .filter_map(|contact_id| self.emails.get(contact_id).cloned())
            .collect()
    }
}
