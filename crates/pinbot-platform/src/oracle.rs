//! Chat-completions oracle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use pinbot_config::OracleConfig;
use pinbot_engine::{BackendError, GenerationPurpose, GenerationRequest, Oracle};

use crate::PlatformError;
use crate::types::{ChatMessage, ChatRequest, ChatResponse};

/// Decisions are a single index or "none"; they need far fewer tokens
/// than generated text.
const DECISION_MAX_TOKENS: u32 = 128;

pub struct OracleClient {
    client: Client,
    config: OracleConfig,
}

impl OracleClient {
    pub fn new(config: OracleConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    async fn complete(&self, prompt: String, max_tokens: u32) -> Result<String, BackendError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::Oracle("no API key configured".into()))?;
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens,
        };
        let resp = self
            .client
            .post(&self.config.api_uri)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Oracle(format!("request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::Oracle(format!("{status}: {text}")));
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Oracle(format!("unreadable response: {e}")))?;
        let answer = parsed
            .first_text()
            .ok_or_else(|| BackendError::Oracle("empty completion".into()))?;
        debug!(model = %self.config.model, answer = %answer, "Oracle answered");
        Ok(answer)
    }
}

#[async_trait]
impl Oracle for OracleClient {
    async fn decide(
        &self,
        profile: &str,
        interests: &str,
        listing: &str,
    ) -> Result<String, BackendError> {
        let prompt = decision_prompt(profile, interests, listing);
        self.complete(prompt, DECISION_MAX_TOKENS.min(self.config.max_tokens))
            .await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        self.complete(generation_prompt(request), self.config.max_tokens)
            .await
    }
}

pub fn decision_prompt(profile: &str, interests: &str, listing: &str) -> String {
    format!(
        "You are browsing a social app as this person: {profile}.\n\
         Your interests: {interests}.\n\
         Here are the posts on the current page:\n{listing}\n\n\
         Pick the one post you would most like to interact with and answer with \
         its number only. If none of them interest you, answer \"none\"."
    )
}

pub fn generation_prompt(request: &GenerationRequest) -> String {
    let persona = format!(
        "You are this person: {}. Your interests: {}.",
        request.profile, request.interests
    );
    match request.purpose {
        GenerationPurpose::Comment => format!(
            "{persona}\nWrite a short, casual comment on this post, in your own voice. \
             Answer with the comment text only.\n\n{}",
            request.context
        ),
        GenerationPurpose::Reply => format!(
            "{persona}\nBelow is a post and its numbered comments. Choose one comment \
             to reply to and answer in the form \"<number> - <reply>\".\n\n{}",
            request.context
        ),
        GenerationPurpose::Post => format!(
            "{persona}\nWrite a short post you would share today about one of your \
             interests. Answer with the post text only."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(purpose: GenerationPurpose, context: &str) -> GenerationRequest {
        GenerationRequest {
            purpose,
            profile: "Tess, 28, Lisbon".into(),
            interests: "food, travel".into(),
            context: context.into(),
        }
    }

    #[test]
    fn test_decision_prompt_includes_listing() {
        let prompt = decision_prompt("Tess", "food", "0. id: v1, title: Ramen, tags: \"food\"");
        assert!(prompt.contains("0. id: v1"));
        assert!(prompt.contains("\"none\""));
    }

    #[test]
    fn test_reply_prompt_asks_for_numbered_answer() {
        let prompt = generation_prompt(&request(
            GenerationPurpose::Reply,
            "Ramen\nComments:\n1. yum",
        ));
        assert!(prompt.contains("<number> - <reply>"));
        assert!(prompt.contains("1. yum"));
    }

    #[test]
    fn test_post_prompt_ignores_context() {
        let prompt = generation_prompt(&request(GenerationPurpose::Post, "leftover"));
        assert!(prompt.contains("food, travel"));
        assert!(!prompt.contains("leftover"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let oracle = OracleClient::new(OracleConfig {
            api_key: None,
            ..OracleConfig::default()
        })
        .unwrap();
        let err = oracle.decide("p", "i", "0. x").await.unwrap_err();
        assert!(matches!(err, BackendError::Oracle(_)));
    }
}
