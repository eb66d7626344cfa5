//! Platform and chat-completions wire types.

use serde::{Deserialize, Serialize};

use pinbot_types::{CommentItem, ContentItem};

// ──────────────────── Auth ────────────────────

/// OAuth2 token endpoint response, also used for agent login.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "expiresIn")]
    pub expires_in: Option<i64>,
}

// ──────────────────── Content ────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagDto {
    Plain(String),
    Object { tag: String },
}

impl TagDto {
    pub fn into_tag(self) -> String {
        match self {
            TagDto::Plain(tag) | TagDto::Object { tag } => tag,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorDto {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
    pub id: String,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagDto>,
    #[serde(default)]
    pub like_count: Option<u32>,
    #[serde(default)]
    pub comment_count: Option<u32>,
    #[serde(default)]
    pub author: Option<AuthorDto>,
}

impl From<ItemDto> for ContentItem {
    fn from(dto: ItemDto) -> Self {
        ContentItem {
            id: dto.id,
            text: dto.text_content.unwrap_or_default(),
            tags: dto.tags.into_iter().map(TagDto::into_tag).collect(),
            like_count: dto.like_count.unwrap_or(0),
            comment_count: dto.comment_count.unwrap_or(0),
            author_id: dto.author.map(|a| a.id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListEntry {
    #[serde(alias = "item")]
    pub vpin: Option<ItemDto>,
}

/// Paged listing: `{ "content": [ { "vpin": {...} }, ... ] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub content: Vec<ListEntry>,
}

impl ListResponse {
    /// Entries without an item are dropped.
    pub fn into_items(self) -> Vec<ContentItem> {
        self.content
            .into_iter()
            .filter_map(|entry| entry.vpin)
            .map(ContentItem::from)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: String,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub author: Option<AuthorDto>,
}

impl From<CommentDto> for CommentItem {
    fn from(dto: CommentDto) -> Self {
        CommentItem {
            id: dto.id,
            text: dto.text_content,
            author_id: dto.author.map(|a| a.id),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentListResponse {
    #[serde(default)]
    pub content: Vec<CommentDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBody<'a> {
    pub text_content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

// ──────────────────── Chat completions ────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    pub fn first_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}
