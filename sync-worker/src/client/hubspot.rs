use super::models::{
    AssociationBatchRequest, AssociationBatchResponse, BatchReadRequest, BatchReadResponse,
    ObjectRef, ObjectType, SearchRequest, SearchResponse, TokenResponse,
};
use super::CrmClient;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// HTTP client for the HubSpot CRM v3 API.
///
/// Authenticates with a Bearer token that can be replaced at any time.
pub struct HubSpotClient {
    http_client: Client,
    base_url: String,
    access_token: RwLock<String>,
}

impl HubSpotClient {
    /// Create a client against `base_url` (e.g. `https://api.hubapi.com`, or a
    /// mock server in tests).
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("hubsync-sync-worker/0.1")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: RwLock::new(String::new()),
        })
    }

    fn access_token(&self) -> String {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, operation: &str) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, operation, "HubSpot request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.access_token())
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", operation))?;

        check_response_status(response)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse {} response", operation))
    }
}

#[async_trait]
impl CrmClient for HubSpotClient {
    async fn search(&self, object: ObjectType, request: &SearchRequest) -> Result<SearchResponse> {
        let path = format!("/crm/v3/objects/{}/search", object.path());
        self.post_json(&path, request, "search").await
    }

    async fn read_associations(
        &self,
        from: ObjectType,
        to: ObjectType,
        ids: &[String],
    ) -> Result<AssociationBatchResponse> {
        let path = format!(
            "/crm/v3/associations/{}/{}/batch/read",
            from.association_name(),
            to.association_name()
        );
        let body = AssociationBatchRequest {
            inputs: ids.iter().map(ObjectRef::new).collect(),
        };
        let body = serde_json::to_value(&body).context("Failed to encode association request")?;

        let response = self.api_request(Method::POST, &path, Some(body)).await?;
        serde_json::from_value(response).context("Failed to parse association response")
    }

    async fn batch_read(
        &self,
        object: ObjectType,
        ids: &[String],
        properties: &[&str],
    ) -> Result<BatchReadResponse> {
        let path = format!("/crm/v3/objects/{}/batch/read", object.path());
        let body = BatchReadRequest {
            inputs: ids.iter().map(ObjectRef::new).collect(),
            properties: properties.iter().map(|p| p.to_string()).collect(),
        };
        self.post_json(&path, &body, "batch read").await
    }

    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let url = format!("{}/oauth/v1/token", self.base_url);
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .context("Failed to send token refresh request")?;

        check_response_status(response)
            .await?
            .json::<TokenResponse>()
            .await
            .context("Failed to parse token refresh response")
    }

    async fn api_request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, method = %method, "HubSpot request");

        let mut request = self
            .http_client
            .request(method, &url)
            .bearer_auth(self.access_token());
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;

        check_response_status(response)
            .await?
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    fn set_access_token(&self, token: &str) {
        let mut current = self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = token.to_string();
    }
}

/// Check the response status and map known error codes to descriptive errors.
///
/// - 401 → auth error (token expired or invalid)
/// - 429 → rate limit (includes Retry-After when present)
/// - Other non-2xx → API error with the response body
async fn check_response_status(response: Response) -> Result<Response> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(anyhow!("HubSpot auth error: token expired or invalid")),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            Err(anyhow!(
                "HubSpot rate limit exceeded (Retry-After: {})",
                retry_after
            ))
        }
        s if !s.is_success() => {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            Err(anyhow!("HubSpot API error {}: {}", s, body))
        }
        _ => Ok(response),
    }
}
