//! REST client for the content platform.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use pinbot_config::PlatformConfig;
use pinbot_engine::{
    ActionBackend, BackendError, BearerToken, ContentSource, CreatePayload, TokenCache,
    TokenProvider,
};
use pinbot_types::{Agent, CommentItem, ContentItem};

use crate::PlatformError;
use crate::types::{CommentListResponse, CreatedResponse, ListResponse, TextBody, TokenResponse};

/// Reads run under the service's client-credentials token; writes run
/// under the acting agent's own token.
pub struct PlatformClient {
    client: Client,
    config: PlatformConfig,
    client_token: TokenCache,
}

impl PlatformClient {
    pub fn new(config: PlatformConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            client_token: TokenCache::default(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.server_uri.trim_end_matches('/'))
    }

    fn list_url(&self, sort: &str, page: u32, page_size: u32) -> String {
        format!(
            "{}?sort={sort}&page={page}&pageSize={page_size}",
            self.url("/list")
        )
    }

    /// Check connectivity and client credentials with a one-item listing.
    pub async fn health(&self, sort: &str) -> Result<usize, BackendError> {
        let items = self.list_items(sort, 0, 1).await?;
        Ok(items.len())
    }

    async fn client_token(&self) -> Result<BearerToken, BackendError> {
        self.client_token
            .get_or_refresh(|| async {
                self.fetch_client_token().await.map_err(BackendError::from)
            })
            .await
    }

    async fn fetch_client_token(&self) -> Result<BearerToken, PlatformError> {
        let secret = self
            .config
            .client_secret
            .as_deref()
            .ok_or_else(|| PlatformError::Config("platform.client_secret".into()))?;
        let resp = self
            .client
            .post(&self.config.login_uri)
            .basic_auth(&self.config.client_id, Some(secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: TokenResponse = json(check("client login", resp).await?).await?;
        debug!("Fetched client token");
        Ok(BearerToken::new(token.access_token, token.expires_in))
    }

    /// GET under the client token. A rejected token is dropped so the next
    /// call logs in again.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: &str,
    ) -> Result<T, BackendError> {
        let token = self.client_token().await?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(PlatformError::from)?;
        match check(endpoint, resp).await {
            Ok(resp) => Ok(json(resp).await?),
            Err(e) => {
                if matches!(e, PlatformError::Status { status: 401, .. }) {
                    self.client_token.invalidate().await;
                }
                Err(e.into())
            }
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let resp = request.send().await.map_err(PlatformError::from)?;
        Ok(check(endpoint, resp).await?)
    }
}

async fn check(endpoint: &str, resp: Response) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(endpoint, status = status.as_u16(), "Platform call rejected");
    Err(PlatformError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, PlatformError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| PlatformError::Malformed(e.to_string()))
}

#[async_trait]
impl ContentSource for PlatformClient {
    async fn list_items(
        &self,
        sort: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ContentItem>, BackendError> {
        let url = self.list_url(sort, page, page_size);
        let resp: ListResponse = self.get_json("list", &url).await?;
        Ok(resp.into_items())
    }

    async fn list_comments(&self, item_id: &str) -> Result<Vec<CommentItem>, BackendError> {
        let url = self.url(&format!("/comment/vpin/{item_id}"));
        let resp: CommentListResponse = self.get_json("comments", &url).await?;
        Ok(resp.content.into_iter().map(CommentItem::from).collect())
    }
}

#[async_trait]
impl ActionBackend for PlatformClient {
    async fn like(&self, token: &BearerToken, item_id: &str) -> Result<(), BackendError> {
        let url = self.url(&format!("/vpin/{item_id}/like"));
        let request = self.client.post(url).bearer_auth(&token.access_token);
        self.send("like", request).await?;
        Ok(())
    }

    async fn comment(
        &self,
        token: &BearerToken,
        item_id: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!("/comment/vpin/{item_id}"));
        let request = self
            .client
            .post(url)
            .bearer_auth(&token.access_token)
            .json(&TextBody { text_content: text });
        self.send("comment", request).await?;
        Ok(())
    }

    async fn reply_to_comment(
        &self,
        token: &BearerToken,
        comment_id: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!("/comment/{comment_id}"));
        let request = self
            .client
            .post(url)
            .bearer_auth(&token.access_token)
            .json(&TextBody { text_content: text });
        self.send("reply", request).await?;
        Ok(())
    }

    async fn create(
        &self,
        token: &BearerToken,
        payload: &CreatePayload,
    ) -> Result<String, BackendError> {
        let request = self
            .client
            .post(self.url("/vpin"))
            .bearer_auth(&token.access_token)
            .json(payload);
        let resp = self.send("create", request).await?;
        let created: CreatedResponse = json(resp).await?;
        Ok(created.id)
    }
}

#[async_trait]
impl TokenProvider for PlatformClient {
    async fn agent_token(&self, agent: &Agent) -> Result<BearerToken, BackendError> {
        let client_token = self.client_token().await?;
        let request = self
            .client
            .post(&self.config.agent_login_uri)
            .bearer_auth(&client_token.access_token)
            .form(&[
                ("username", agent.username.as_str()),
                ("password", agent.password.as_str()),
            ]);
        let resp = self.send("agent login", request).await?;
        let token: TokenResponse = json(resp).await?;
        debug!(agent_id = %agent.id, "Agent logged in");
        Ok(BearerToken::new(token.access_token, token.expires_in))
    }
}
