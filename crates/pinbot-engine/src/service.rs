//! Administrative surface: onboarding, scheduling, start/stop, deletion.
//!
//! Processes other than the one running the scheduler go through
//! [`AgentService::request`], which queues the action in the store for the
//! running service's control loop.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{info, warn};

use pinbot_cron::dispatcher::JobDispatcher;
use pinbot_cron::planner::{self, plan_day};
use pinbot_hooks::{StatusEvent, StatusRegistry};
use pinbot_storage::AgentStore;
use pinbot_types::{Agent, AgentProfile, ControlAction, ControlRequest};

use crate::command::compile_pipeline;
use crate::error::{EngineError, Result};
use crate::executor::{ActionExecutor, CycleReport};
use crate::slots::AgentSlots;

const GENERATED_PASSWORD_LEN: usize = 10;

pub struct AgentService {
    store: Arc<AgentStore>,
    dispatcher: Arc<JobDispatcher>,
    slots: Arc<AgentSlots>,
    executor: Arc<ActionExecutor>,
    status: Arc<StatusRegistry>,
}

impl AgentService {
    pub fn new(
        store: Arc<AgentStore>,
        dispatcher: Arc<JobDispatcher>,
        slots: Arc<AgentSlots>,
        executor: Arc<ActionExecutor>,
        status: Arc<StatusRegistry>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            slots,
            executor,
            status,
        }
    }

    /// Validate a profile, store the new agent, and schedule its day.
    pub async fn onboard(&self, profile: AgentProfile) -> Result<Agent> {
        let agent = self.register(profile).await?;
        let scheduled = self.reschedule(&agent.id).await?;
        info!(agent_id = %agent.id, username = %agent.username, scheduled, "Agent onboarded");
        Ok(agent)
    }

    /// Validate a profile and store the new agent without scheduling it.
    pub async fn register(&self, profile: AgentProfile) -> Result<Agent> {
        validate_profile(&profile)?;
        let password = profile
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(generate_password);
        let agent = Agent::from_profile(profile, password);
        self.store.save_agent(&agent).await?;
        Ok(agent)
    }

    /// Queue `action` for the process running the scheduler.
    pub async fn request(&self, agent_id: &str, action: ControlAction) -> Result<i64> {
        self.load(agent_id).await?;
        let id = self.store.enqueue_control(agent_id, action).await?;
        info!(agent_id = %agent_id, action = action.as_str(), id, "Control request queued");
        Ok(id)
    }

    pub async fn take_control_requests(&self) -> Result<Vec<ControlRequest>> {
        Ok(self.store.take_control_requests().await?)
    }

    /// Replace the agent's pending jobs with a fresh plan from now.
    pub async fn reschedule(&self, agent_id: &str) -> Result<usize> {
        self.reschedule_at(agent_id, Local::now().naive_local()).await
    }

    /// Replace the agent's pending jobs with a plan computed as of `now`
    /// (local wall-clock time). An invalid interval fails the call and
    /// leaves the existing jobs in place.
    pub async fn reschedule_at(&self, agent_id: &str, now: NaiveDateTime) -> Result<usize> {
        let agent = self.load(agent_id).await?;
        let plan = {
            let mut rng = rand::thread_rng();
            plan_day(&agent.intervals, now, &mut rng)?
        };

        self.dispatcher.cancel_all(agent_id).await?;
        let mut scheduled = 0;
        for local in plan {
            let Some(at) = local.and_local_timezone(Local).earliest() else {
                warn!(
                    agent_id = %agent_id,
                    %local,
                    "Fire time does not exist in local time zone, skipping"
                );
                continue;
            };
            if self
                .dispatcher
                .schedule(agent_id, at.with_timezone(&Utc))
                .await?
            {
                scheduled += 1;
            }
        }
        info!(agent_id = %agent_id, scheduled, "Agent rescheduled");
        Ok(scheduled)
    }

    /// Reschedule every stored agent. Per-agent failures are logged and skipped.
    pub async fn reschedule_all(&self) -> Result<usize> {
        let mut total = 0;
        for agent in self.store.list_agents().await? {
            match self.reschedule(&agent.id).await {
                Ok(n) => total += n,
                Err(e) => warn!(agent_id = %agent.id, "Failed to reschedule: {e}"),
            }
        }
        Ok(total)
    }

    /// Clear a previous stop request and schedule the agent again.
    pub async fn start_agent(&self, agent_id: &str) -> Result<usize> {
        self.load(agent_id).await?;
        self.slots.get(agent_id).await.clear_stop();
        self.reschedule(agent_id).await
    }

    /// Run one cycle immediately, outside the schedule.
    pub async fn run_now(&self, agent_id: &str) -> Result<CycleReport> {
        self.slots.get(agent_id).await.clear_stop();
        self.executor.run_cycle(agent_id).await
    }

    /// Request a cooperative stop and drop pending jobs. An in-flight cycle
    /// halts at its next step boundary.
    pub async fn stop_agent(&self, agent_id: &str) -> Result<usize> {
        self.slots.get(agent_id).await.request_stop();
        let cancelled = self.dispatcher.cancel_all(agent_id).await?;
        self.status
            .emit(StatusEvent::log(agent_id, "stop requested"))
            .await;
        info!(agent_id = %agent_id, cancelled, "Agent stopped");
        Ok(cancelled)
    }

    /// Request a stop for every agent. Pending jobs are left to the dispatcher's shutdown.
    pub async fn stop_all(&self) {
        let mut ids: Vec<String> = match self.store.list_agents().await {
            Ok(agents) => agents.into_iter().map(|a| a.id).collect(),
            Err(e) => {
                warn!("Failed to list agents while stopping: {e}");
                Vec::new()
            }
        };
        ids.extend(self.slots.all().await.into_iter().map(|(id, _)| id));
        for id in ids {
            self.slots.get(&id).await.request_stop();
        }
    }

    /// Stop and remove an agent with its interaction log. Waits for any
    /// in-flight edge commit so it cannot write the agent back.
    pub async fn delete_agent(&self, agent_id: &str) -> Result<bool> {
        self.stop_agent(agent_id).await?;
        let slot = self.slots.get(agent_id).await;
        let removed = {
            let _write = slot.write.lock().await;
            self.store.delete_agent(agent_id).await?
        };
        self.slots.remove(agent_id).await;
        if removed {
            info!(agent_id = %agent_id, "Agent deleted");
        }
        Ok(removed)
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.store.list_agents().await?)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.store.get_agent(agent_id).await?)
    }

    async fn load(&self, agent_id: &str) -> Result<Agent> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| EngineError::AgentNotFound(agent_id.to_string()))
    }
}

fn validate_profile(profile: &AgentProfile) -> Result<()> {
    if profile.username.trim().is_empty() {
        return Err(EngineError::InvalidAgent("username is empty".into()));
    }
    if profile.functions.is_empty() {
        return Err(EngineError::InvalidAgent("no functions declared".into()));
    }
    compile_pipeline(&profile.functions)?;
    for interval in &profile.intervals {
        planner::validate(interval)?;
    }
    Ok(())
}

/// Random alphanumeric password for agents onboarded without one.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
