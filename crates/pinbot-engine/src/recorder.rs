//! Appends interaction edges to an agent and persists the result.

use std::sync::Arc;

use tracing::debug;

use pinbot_storage::AgentStore;
use pinbot_types::{Agent, EdgeKind, InteractionEdge};

use crate::error::EngineError;
use crate::slots::AgentSlots;

pub struct RelationshipRecorder {
    store: Arc<AgentStore>,
    slots: Arc<AgentSlots>,
}

impl RelationshipRecorder {
    pub fn new(store: Arc<AgentStore>, slots: Arc<AgentSlots>) -> Self {
        Self { store, slots }
    }

    /// Append one edge, point last-interacted at `target_id`, persist, and
    /// return the committed agent. `agent` is updated to the committed state.
    ///
    /// Every call appends; retrying a call records the interaction twice.
    pub async fn record(
        &self,
        agent: &mut Agent,
        kind: EdgeKind,
        target_id: &str,
    ) -> Result<Agent, EngineError> {
        self.commit(agent, vec![InteractionEdge::new(kind, target_id)], target_id)
            .await
    }

    /// A reply touches two targets: the comment replied to and the item it
    /// sits under. Both edges land in one write; last-interacted is the item.
    pub async fn record_reply(
        &self,
        agent: &mut Agent,
        item_id: &str,
        comment_id: &str,
    ) -> Result<Agent, EngineError> {
        let edges = vec![
            InteractionEdge::new(EdgeKind::InteractedWithCommentUnder, item_id),
            InteractionEdge::new(EdgeKind::RepliedTo, comment_id),
        ];
        self.commit(agent, edges, item_id).await
    }

    async fn commit(
        &self,
        agent: &mut Agent,
        edges: Vec<InteractionEdge>,
        last_interacted: &str,
    ) -> Result<Agent, EngineError> {
        let slot = self.slots.get(&agent.id).await;
        let _write = slot.write.lock().await;

        // Reload so fields written by others since `agent` was read survive.
        let mut stored = self
            .store
            .get_agent(&agent.id)
            .await?
            .ok_or_else(|| EngineError::AgentNotFound(agent.id.clone()))?;
        for edge in &edges {
            debug!(
                agent_id = %stored.id,
                kind = edge.kind.as_str(),
                target = %edge.target_id,
                "Recording edge"
            );
        }
        stored.edges.extend(edges);
        stored.last_interacted_item_id = Some(last_interacted.to_string());
        self.store.save_agent(&stored).await?;

        *agent = stored.clone();
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::agent_with;

    async fn setup() -> (Arc<AgentStore>, RelationshipRecorder, Agent) {
        let store = Arc::new(AgentStore::open_in_memory().unwrap());
        let agent = agent_with(&["LIKE"]);
        store.save_agent(&agent).await.unwrap();
        let recorder = RelationshipRecorder::new(store.clone(), Arc::new(AgentSlots::new()));
        (store, recorder, agent)
    }

    #[tokio::test]
    async fn test_record_appends_and_persists() {
        let (store, recorder, mut agent) = setup().await;

        let committed = recorder
            .record(&mut agent, EdgeKind::Liked, "x")
            .await
            .unwrap();
        assert_eq!(committed.edges.len(), 1);
        assert_eq!(agent.last_interacted_item_id.as_deref(), Some("x"));

        let stored = store.get_agent(&agent.id).await.unwrap().unwrap();
        assert_eq!(stored.edges_of(EdgeKind::Liked).count(), 1);
        assert_eq!(stored.last_interacted_item_id.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_record_is_not_idempotent() {
        let (_store, recorder, mut agent) = setup().await;
        recorder.record(&mut agent, EdgeKind::Liked, "x").await.unwrap();
        recorder.record(&mut agent, EdgeKind::Liked, "x").await.unwrap();
        assert_eq!(agent.edges.len(), 2);
    }

    #[tokio::test]
    async fn test_record_preserves_concurrent_active_flag() {
        let (store, recorder, mut agent) = setup().await;
        // Written after `agent` was loaded.
        store.set_active(&agent.id, true).await.unwrap();
        assert!(!agent.is_active);

        recorder
            .record(&mut agent, EdgeKind::CommentedOn, "x")
            .await
            .unwrap();
        assert!(agent.is_active);
        assert!(store.get_agent(&agent.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_record_reply_commits_both_edges() {
        let (store, recorder, mut agent) = setup().await;
        recorder
            .record_reply(&mut agent, "item-1", "comment-9")
            .await
            .unwrap();

        let stored = store.get_agent(&agent.id).await.unwrap().unwrap();
        let kinds: Vec<EdgeKind> = stored.edges.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EdgeKind::InteractedWithCommentUnder, EdgeKind::RepliedTo]
        );
        assert_eq!(stored.edges[1].target_id, "comment-9");
        assert_eq!(stored.last_interacted_item_id.as_deref(), Some("item-1"));
    }

    #[tokio::test]
    async fn test_record_for_deleted_agent_fails() {
        let (store, recorder, mut agent) = setup().await;
        store.delete_agent(&agent.id).await.unwrap();
        let err = recorder
            .record(&mut agent, EdgeKind::Liked, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AgentNotFound(_)));
    }
}
