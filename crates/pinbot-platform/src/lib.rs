//! pinbot-platform: HTTP adapters for the content platform and the oracle.
//!
//! `PlatformClient` implements the engine's content, action and token
//! ports against the platform's REST API; `OracleClient` implements the
//! oracle port against an OpenAI-compatible chat-completions endpoint.

pub mod client;
pub mod oracle;
pub mod types;

pub use client::PlatformClient;
pub use oracle::OracleClient;

use pinbot_engine::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("missing configuration: {0}")]
    Config(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<PlatformError> for BackendError {
    fn from(err: PlatformError) -> Self {
        match &err {
            PlatformError::Http(_) => BackendError::Transport(err.to_string()),
            PlatformError::Status {
                status: 401 | 403, ..
            }
            | PlatformError::Config(_) => BackendError::Auth(err.to_string()),
            PlatformError::Status { .. } | PlatformError::Malformed(_) => {
                BackendError::Response(err.to_string())
            }
        }
    }
}
