//! Expiring bearer-token cache with single-flight refresh.

use std::future::Future;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use crate::backend::{BackendError, BearerToken};

/// Holds at most one token. Concurrent callers that find it stale wait on
/// the same refresh instead of each fetching their own.
pub struct TokenCache {
    slot: Mutex<Option<BearerToken>>,
    skew: Duration,
}

impl TokenCache {
    /// Tokens are refreshed `skew` before they expire.
    pub fn new(skew: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            skew,
        }
    }

    /// Return the cached token, or run `refresh` and cache its result.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<BearerToken, BackendError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BearerToken, BackendError>>,
    {
        // Held across the refresh call: that is the single-flight guard.
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh(Utc::now(), self.skew)) {
            return Ok(token.clone());
        }
        let fresh = refresh().await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached token, e.g. after the server rejected it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::seconds(30))
    }
}
