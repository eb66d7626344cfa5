//! Job dispatcher: a min-heap of one-shot jobs and the timer loop that fires them.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ScheduledJob;
use crate::store::JobStore;

/// Upper bound on one timer sleep, so wall-clock drift is picked up.
const MAX_SLEEP: Duration = Duration::from_secs(60);

#[derive(Default)]
struct DispatchState {
    /// `(fire_at, key)` ordered earliest first. Cancelled keys stay here
    /// until popped and are skipped because they left `pending`.
    heap: BinaryHeap<Reverse<(DateTime<Utc>, String)>>,
    pending: HashMap<String, ScheduledJob>,
}

impl DispatchState {
    fn push(&mut self, job: ScheduledJob) {
        self.heap.push(Reverse((job.fire_at, job.key.clone())));
        self.pending.insert(job.key.clone(), job);
    }

    fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse((fire_at, key))) = self.heap.peek() {
            if self.pending.contains_key(key) {
                return Some(*fire_at);
            }
            self.heap.pop();
        }
        None
    }
}

/// Holds pending jobs and hands each to the worker queue once it is due.
pub struct JobDispatcher {
    state: Mutex<DispatchState>,
    wake: Notify,
    store: Option<Arc<JobStore>>,
}

impl Default for JobDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl JobDispatcher {
    /// In-memory dispatcher; pending jobs are lost on restart.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DispatchState::default()),
            wake: Notify::new(),
            store: None,
        }
    }

    /// Dispatcher that mirrors pending jobs into `store`.
    pub fn with_store(store: Arc<JobStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Reload persisted jobs. Future jobs are re-armed; past-due ones are
    /// dropped as misfires. Returns `(restored, dropped)`.
    pub async fn restore(&self) -> anyhow::Result<(usize, usize)> {
        let Some(store) = &self.store else {
            return Ok((0, 0));
        };
        let now = Utc::now();
        let mut restored = 0;
        let mut dropped = 0;
        let mut state = self.state.lock().await;
        for job in store.list()? {
            if job.fire_at <= now {
                warn!(agent_id = %job.agent_id, key = %job.key, "Dropping misfired job");
                store.delete(&job.key)?;
                dropped += 1;
            } else if !state.pending.contains_key(&job.key) {
                state.push(job);
                restored += 1;
            }
        }
        drop(state);
        self.wake.notify_one();
        info!("Restored {restored} scheduled jobs ({dropped} misfires dropped)");
        Ok((restored, dropped))
    }

    /// Register a one-shot job. Returns false when the same agent already
    /// has a job at this exact time.
    pub async fn schedule(&self, agent_id: &str, fire_at: DateTime<Utc>) -> anyhow::Result<bool> {
        let job = ScheduledJob::new(agent_id, fire_at);
        let mut state = self.state.lock().await;
        if state.pending.contains_key(&job.key) {
            return Ok(false);
        }
        if let Some(store) = &self.store {
            store.insert(&job)?;
        }
        debug!(agent_id = %agent_id, fire_at = %fire_at, "Scheduled job");
        state.push(job);
        drop(state);
        self.wake.notify_one();
        Ok(true)
    }

    /// Remove every pending job of one agent. Returns how many were removed.
    pub async fn cancel_all(&self, agent_id: &str) -> anyhow::Result<usize> {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|_, job| job.agent_id != agent_id);
        let removed = before - state.pending.len();
        if let Some(store) = &self.store {
            store.delete_for_agent(agent_id)?;
        }
        if removed > 0 {
            debug!(agent_id = %agent_id, "Cancelled {removed} pending jobs");
        }
        Ok(removed)
    }

    /// Pending jobs of one agent, earliest first.
    pub async fn pending(&self, agent_id: &str) -> Vec<ScheduledJob> {
        let state = self.state.lock().await;
        let mut jobs: Vec<ScheduledJob> = state
            .pending
            .values()
            .filter(|j| j.agent_id == agent_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.fire_at);
        jobs
    }

    /// Number of pending jobs across all agents.
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Pop every job due at or before `now`. Each job is returned once.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let mut state = self.state.lock().await;
        let mut due = Vec::new();
        while let Some(Reverse((fire_at, _))) = state.heap.peek() {
            if *fire_at > now {
                break;
            }
            let Some(Reverse((_, key))) = state.heap.pop() else {
                break;
            };
            if let Some(job) = state.pending.remove(&key) {
                due.push(job);
            }
        }
        drop(state);

        if let Some(store) = &self.store {
            for job in &due {
                if let Err(e) = store.delete(&job.key) {
                    warn!("Failed to remove fired job {} from store: {e}", job.key);
                }
            }
        }
        due
    }

    async fn next_sleep(&self) -> Duration {
        let deadline = self.state.lock().await.next_deadline();
        match deadline {
            Some(at) => (at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(MAX_SLEEP),
            None => MAX_SLEEP,
        }
    }

    /// Timer loop: sleep until the earliest deadline (or a new schedule),
    /// then send every due job to `sender`. Runs until `cancel` fires or the
    /// receiving side is dropped.
    pub async fn run(
        self: Arc<Self>,
        sender: mpsc::Sender<ScheduledJob>,
        cancel: CancellationToken,
    ) {
        info!("Job dispatcher started");
        loop {
            for job in self.take_due(Utc::now()).await {
                info!(agent_id = %job.agent_id, key = %job.key, "Firing job");
                if sender.send(job).await.is_err() {
                    warn!("Worker queue closed, stopping dispatcher");
                    return;
                }
            }

            let sleep_for = self.next_sleep().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
        info!("Job dispatcher stopped");
    }
}
