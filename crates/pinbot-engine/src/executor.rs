//! Per-cycle orchestration for one agent.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{info, warn};

use pinbot_config::BrowseConfig;
use pinbot_hooks::{StatusEvent, StatusRegistry};
use pinbot_storage::AgentStore;
use pinbot_types::Agent;

use crate::backend::{Backends, TokenProvider};
use crate::command::{CommandKind, compile_pipeline};
use crate::error::EngineError;
use crate::pipeline::{CommandPipeline, PipelineContext};
use crate::recorder::RelationshipRecorder;
use crate::selection::ContentSelectionLoop;
use crate::slots::{AgentSlot, AgentSlots};

/// Outcome of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub agent_id: String,
    /// Another cycle of the same agent was in flight; nothing ran.
    pub busy: bool,
    /// Declared functions that ran to completion.
    pub functions_run: usize,
    pub executed: Vec<CommandKind>,
    pub halted: bool,
}

impl CycleReport {
    fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            ..Self::default()
        }
    }
}

pub struct ActionExecutor {
    store: Arc<AgentStore>,
    slots: Arc<AgentSlots>,
    status: Arc<StatusRegistry>,
    tokens: Arc<dyn TokenProvider>,
    selection: ContentSelectionLoop,
    pipeline: CommandPipeline,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<AgentStore>,
        slots: Arc<AgentSlots>,
        status: Arc<StatusRegistry>,
        backends: Backends,
        browse: BrowseConfig,
    ) -> Self {
        let recorder = Arc::new(RelationshipRecorder::new(store.clone(), slots.clone()));
        let selection = ContentSelectionLoop::new(
            backends.content.clone(),
            backends.oracle.clone(),
            status.clone(),
            browse,
        );
        let pipeline = CommandPipeline::new(
            backends.content,
            backends.oracle,
            backends.actions,
            recorder,
            status.clone(),
        );
        Self {
            store,
            slots,
            status,
            tokens: backends.tokens,
            selection,
            pipeline,
        }
    }

    /// Run one cycle for `agent_id`.
    ///
    /// A cycle that finds another one of the same agent in flight returns a
    /// `busy` report without side effects, as does any configuration error
    /// found before the agent goes active. Once active, the agent is always
    /// marked inactive again and "offline" is always published, whatever the
    /// outcome (panics included).
    pub async fn run_cycle(&self, agent_id: &str) -> Result<CycleReport, EngineError> {
        let slot = self.slots.get(agent_id).await;
        let Ok(cycle) = slot.cycle.try_lock() else {
            info!(agent_id = %agent_id, "Cycle already in flight, skipping");
            return Ok(CycleReport {
                busy: true,
                ..CycleReport::new(agent_id)
            });
        };

        let Some(mut agent) = self.store.get_agent(agent_id).await? else {
            drop(cycle);
            self.slots.remove(agent_id).await;
            return Err(EngineError::AgentNotFound(agent_id.to_string()));
        };
        let steps = compile_pipeline(&agent.functions)?;

        self.set_active(&slot, &mut agent, true).await;
        let outcome = AssertUnwindSafe(self.run_functions(&slot, &mut agent, &steps))
            .catch_unwind()
            .await;
        self.set_active(&slot, &mut agent, false).await;
        drop(cycle);

        match outcome {
            Ok(Ok(report)) => {
                info!(
                    agent_id = %agent_id,
                    functions = report.functions_run,
                    actions = report.executed.len(),
                    halted = report.halted,
                    "Cycle finished"
                );
                Ok(report)
            }
            Ok(Err(e)) => {
                warn!(agent_id = %agent_id, "Cycle failed: {e}");
                Err(e)
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(agent_id = %agent_id, "Cycle panicked: {message}");
                Err(EngineError::Panicked(message))
            }
        }
    }

    async fn run_functions(
        &self,
        slot: &AgentSlot,
        agent: &mut Agent,
        steps: &[CommandKind],
    ) -> Result<CycleReport, EngineError> {
        let token = self
            .tokens
            .agent_token(agent)
            .await
            .map_err(|source| EngineError::Auth {
                agent_id: agent.id.clone(),
                source,
            })?;

        let mut report = CycleReport::new(&agent.id);
        for &function in steps {
            if slot.stop_requested() {
                info!(agent_id = %agent.id, "Stop requested, ending cycle");
                report.halted = true;
                break;
            }

            let item = if function.is_creation() {
                None
            } else {
                let mut browse = slot.browse.lock().await;
                match self.selection.select(agent, &mut browse).await {
                    Ok(Some(item)) => Some(item),
                    Ok(None) => {
                        report.functions_run += 1;
                        continue;
                    }
                    Err(e) if e.is_step_local() => {
                        warn!(agent_id = %agent.id, function = %function, "Selection failed: {e}");
                        self.status
                            .emit(StatusEvent::log(
                                &agent.id,
                                format!("{} could not pick an item: {e}", agent.nickname),
                            ))
                            .await;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            let mut ctx = PipelineContext {
                agent: &mut *agent,
                token: &token,
                stop: slot.stop_flag(),
            };
            let run = self.pipeline.execute(&mut ctx, steps, item).await?;
            report.functions_run += 1;
            report.executed.extend(run.executed);
            if run.halted {
                report.halted = true;
                break;
            }
        }
        Ok(report)
    }

    /// Flip the runtime flag, persist it under the agent's write lock, and
    /// publish the status change. Persistence failures are logged only.
    async fn set_active(&self, slot: &AgentSlot, agent: &mut Agent, active: bool) {
        slot.set_active(active);
        agent.is_active = active;
        {
            let _write = slot.write.lock().await;
            if let Err(e) = self.store.set_active(&agent.id, active).await {
                warn!(agent_id = %agent.id, "Failed to persist active flag: {e}");
            }
        }
        let event = if active {
            StatusEvent::AgentOnline {
                agent_id: agent.id.clone(),
            }
        } else {
            StatusEvent::AgentOffline {
                agent_id: agent.id.clone(),
            }
        };
        self.status.emit(event).await;
    }
}
