//! Ports to everything outside the engine: content listing, the oracle,
//! action endpoints, and agent credentials.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use pinbot_types::{Agent, CommentItem, ContentItem};

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("oracle error: {0}")]
    Oracle(String),
    #[error("unexpected response: {0}")]
    Response(String),
}

/// An access token with an optional expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    pub fn new(access_token: impl Into<String>, expires_in_secs: Option<i64>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }

    /// Usable for at least `skew` longer. Tokens without an expiry never go stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + skew < expires_at,
            None => true,
        }
    }
}

/// What the oracle is asked to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPurpose {
    /// A comment on a content item.
    Comment,
    /// A reply to one of a numbered list of comments, answered as `"<n> - <text>"`.
    Reply,
    /// The text of a new post.
    Post,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub purpose: GenerationPurpose,
    pub profile: String,
    pub interests: String,
    /// Item text, comment listing, or empty for posts.
    pub context: String,
}

/// Body of a content-creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayload {
    pub text_content: String,
    pub tags: Vec<String>,
    pub locale: String,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// One page of candidate items.
    async fn list_items(
        &self,
        sort: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ContentItem>, BackendError>;

    /// Comments under one item.
    async fn list_comments(&self, item_id: &str) -> Result<Vec<CommentItem>, BackendError>;
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Pick one candidate from `listing`, or answer the "none" token.
    async fn decide(
        &self,
        profile: &str,
        interests: &str,
        listing: &str,
    ) -> Result<String, BackendError>;

    /// Free-text generation for comments, replies and posts.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError>;
}

#[async_trait]
pub trait ActionBackend: Send + Sync {
    async fn like(&self, token: &BearerToken, item_id: &str) -> Result<(), BackendError>;

    async fn comment(
        &self,
        token: &BearerToken,
        item_id: &str,
        text: &str,
    ) -> Result<(), BackendError>;

    async fn reply_to_comment(
        &self,
        token: &BearerToken,
        comment_id: &str,
        text: &str,
    ) -> Result<(), BackendError>;

    /// Publish a new item and return its id.
    async fn create(
        &self,
        token: &BearerToken,
        payload: &CreatePayload,
    ) -> Result<String, BackendError>;
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Log the agent in and return its bearer credential.
    async fn agent_token(&self, agent: &Agent) -> Result<BearerToken, BackendError>;
}

/// The collaborator set an executor is built from.
#[derive(Clone)]
pub struct Backends {
    pub content: Arc<dyn ContentSource>,
    pub oracle: Arc<dyn Oracle>,
    pub actions: Arc<dyn ActionBackend>,
    pub tokens: Arc<dyn TokenProvider>,
}
