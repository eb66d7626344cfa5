//! Per-agent runtime state: the single-flight cycle guard, the write lock,
//! the stop and active flags, and the browse cursor.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock};

use crate::selection::BrowseContext;

#[derive(Default)]
pub struct AgentSlot {
    /// Held for the whole of a cycle; a second cycle that cannot take it is skipped.
    pub cycle: Mutex<()>,
    /// Serializes read-modify-write persistence of the agent.
    pub write: Mutex<()>,
    pub browse: Mutex<BrowseContext>,
    stop: AtomicBool,
    active: AtomicBool,
}

impl AgentSlot {
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Lazily created slots, one per agent id.
#[derive(Default)]
pub struct AgentSlots {
    slots: RwLock<HashMap<String, Arc<AgentSlot>>>,
}

impl AgentSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// The agent's slot, created on first use.
    pub async fn get(&self, agent_id: &str) -> Arc<AgentSlot> {
        if let Some(slot) = self.slots.read().await.get(agent_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .clone()
    }

    pub async fn remove(&self, agent_id: &str) -> Option<Arc<AgentSlot>> {
        self.slots.write().await.remove(agent_id)
    }

    pub async fn all(&self) -> Vec<(String, Arc<AgentSlot>)> {
        self.slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_returns_same_slot() {
        let slots = AgentSlots::new();
        let a = slots.get("a").await;
        a.request_stop();
        assert!(slots.get("a").await.stop_requested());
        assert!(!slots.get("b").await.stop_requested());
        assert_eq!(slots.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_guard_is_exclusive() {
        let slots = AgentSlots::new();
        let slot = slots.get("a").await;
        let held = slot.cycle.try_lock().unwrap();
        assert!(slot.cycle.try_lock().is_err());
        drop(held);
        assert!(slot.cycle.try_lock().is_ok());
    }
}
