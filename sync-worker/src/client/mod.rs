//! Remote CRM client interface and its HubSpot implementation.

mod hubspot;
pub mod models;

pub use hubspot::HubSpotClient;
pub use models::ObjectType;

use anyhow::Result;
use async_trait::async_trait;
use models::{
    AssociationBatchResponse, BatchReadResponse, SearchRequest, SearchResponse, TokenResponse,
};
use reqwest::Method;
use serde_json::Value;

/// Operations the sync engine needs from the CRM.
///
/// One client is shared by every account session in a run; the access token it
/// sends is swapped with [`CrmClient::set_access_token`] when a session starts
/// and whenever its credentials are refreshed.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Date-filtered, sorted object search (one page).
    async fn search(&self, object: ObjectType, request: &SearchRequest) -> Result<SearchResponse>;

    /// Batch association read from `from` objects to `to` objects.
    async fn read_associations(
        &self,
        from: ObjectType,
        to: ObjectType,
        ids: &[String],
    ) -> Result<AssociationBatchResponse>;

    /// Batch record read by id, returning only `properties`.
    async fn batch_read(
        &self,
        object: ObjectType,
        ids: &[String],
        properties: &[&str],
    ) -> Result<BatchReadResponse>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse>;

    /// Authenticated request against an arbitrary API path.
    async fn api_request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value>;

    /// Replaces the bearer token used for subsequent calls.
    fn set_access_token(&self, token: &str);
}
