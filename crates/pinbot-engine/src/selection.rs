//! Content selection: page through candidates until the oracle picks one.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use pinbot_config::BrowseConfig;
use pinbot_hooks::{StatusEvent, StatusRegistry};
use pinbot_types::{Agent, ContentItem};

use crate::backend::{ContentSource, Oracle};
use crate::error::EngineError;

/// A leading candidate index, tolerating `#3`, `3.`, `Index: 3`.
static LEADING_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:index\s*:?\s*)?#?(\d+)").unwrap());

/// Oracle output that does not name a listed candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("decision `{0}` does not name a listed candidate")]
    Unparseable(String),
    #[error("decision index {index} is outside the {candidates} listed candidates")]
    IndexOutOfRange { index: usize, candidates: usize },
    #[error("reply decision `{0}` is not of the form `<n> - <text>`")]
    MalformedReply(String),
}

/// Per-agent browse state carried from one cycle to the next.
#[derive(Debug, Clone, Default)]
pub struct BrowseContext {
    /// Next page to fetch. Advances by one on every miss.
    pub page: u32,
    /// Most recent pick.
    pub last_interacted: Option<ContentItem>,
}

/// One line per candidate, zero-based:
/// `0. id: <id>, title: <text>, tags: "a", "b"`.
pub fn render_listing(items: &[ContentItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let title = item.text.replace(['\r', '\n'], " ");
            let tags = item
                .tags
                .iter()
                .map(|t| format!("\"{t}\""))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{i}. id: {}, title: {title}, tags: {tags}", item.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map an oracle decision to an index into `items`.
///
/// A leading listed index wins; otherwise a candidate id echoed as a whole
/// word anywhere in the decision is accepted.
pub fn resolve_decision(decision: &str, items: &[ContentItem]) -> Result<usize, SelectionError> {
    let by_index = LEADING_INDEX
        .captures(decision)
        .and_then(|caps| caps[1].parse::<usize>().ok());
    if let Some(index) = by_index {
        if index < items.len() {
            return Ok(index);
        }
        if let Some(found) = position_by_id(decision, items) {
            return Ok(found);
        }
        return Err(SelectionError::IndexOutOfRange {
            index,
            candidates: items.len(),
        });
    }
    position_by_id(decision, items)
        .ok_or_else(|| SelectionError::Unparseable(decision.trim().to_string()))
}

fn position_by_id(decision: &str, items: &[ContentItem]) -> Option<usize> {
    let words: Vec<&str> = decision
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    items
        .iter()
        .position(|item| words.contains(&item.id.as_str()))
}

/// Bounded, paginated search for one item worth interacting with.
pub struct ContentSelectionLoop {
    content: Arc<dyn ContentSource>,
    oracle: Arc<dyn Oracle>,
    status: Arc<StatusRegistry>,
    config: BrowseConfig,
}

impl ContentSelectionLoop {
    pub fn new(
        content: Arc<dyn ContentSource>,
        oracle: Arc<dyn Oracle>,
        status: Arc<StatusRegistry>,
        config: BrowseConfig,
    ) -> Self {
        Self {
            content,
            oracle,
            status,
            config,
        }
    }

    fn is_none_answer(&self, decision: &str) -> bool {
        decision
            .trim()
            .trim_end_matches('.')
            .eq_ignore_ascii_case(&self.config.none_token)
    }

    /// Search from `browse.page` onward.
    ///
    /// Each miss (a "none" answer or an empty page) advances the cursor and
    /// counts one attempt; the search gives up after `max_attempts` misses.
    /// Backend and oracle failures end the search with an error.
    pub async fn select(
        &self,
        agent: &Agent,
        browse: &mut BrowseContext,
    ) -> Result<Option<ContentItem>, EngineError> {
        let profile = agent.profile_text();
        let interests = agent.interests_text();
        let mut attempts = 0u32;

        while attempts < self.config.max_attempts {
            let page = self
                .content
                .list_items(&self.config.sort, browse.page, self.config.page_size)
                .await?;

            let picked = if page.is_empty() {
                debug!(agent_id = %agent.id, page = browse.page, "Empty page");
                None
            } else {
                let listing = render_listing(&page);
                let decision = self.oracle.decide(&profile, &interests, &listing).await?;
                if self.is_none_answer(&decision) {
                    None
                } else {
                    let index = resolve_decision(&decision, &page)?;
                    page.into_iter().nth(index)
                }
            };

            match picked {
                Some(item) => {
                    info!(
                        agent_id = %agent.id,
                        item_id = %item.id,
                        page = browse.page,
                        "Selected item"
                    );
                    browse.last_interacted = Some(item.clone());
                    return Ok(Some(item));
                }
                None => {
                    self.status
                        .emit(StatusEvent::log(
                            &agent.id,
                            format!(
                                "{} found nothing interesting on page {}",
                                agent.nickname, browse.page
                            ),
                        ))
                        .await;
                    browse.page = browse.page.saturating_add(1);
                    attempts += 1;
                }
            }
        }

        info!(agent_id = %agent.id, attempts, "No item selected");
        // Only reachable with max_attempts = 0.
        Ok(if attempts == 0 {
            browse.last_interacted.clone()
        } else {
            None
        })
    }
}
