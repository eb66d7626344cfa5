use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pinbot_config::PinbotConfig;
use pinbot_engine::worker::{run_control_loop, run_daily_replan, run_workers};
use pinbot_hooks::StatusEvent;

use crate::app::App;

/// Run the scheduler until Ctrl-C.
pub async fn run(config: PinbotConfig) -> Result<()> {
    let app = App::build(config).await?;
    let engine = app.config.engine.clone();

    match app.dispatcher.restore().await {
        Ok((restored, dropped)) if restored + dropped > 0 => {
            info!(restored, dropped, "Restored pending jobs")
        }
        Ok(_) => {}
        Err(e) => warn!("Job restoration failed: {e}"),
    }

    // Agents with restored jobs keep them; the rest get today's plan.
    let mut scheduled = 0;
    for agent in app.service.list_agents().await? {
        if !app.dispatcher.pending(&agent.id).await.is_empty() {
            continue;
        }
        match app.service.reschedule(&agent.id).await {
            Ok(n) => scheduled += n,
            Err(e) => warn!(agent_id = %agent.id, "Scheduling failed: {e}"),
        }
    }
    info!(scheduled, pending = app.dispatcher.len().await, "Agents scheduled");

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(engine.queue_capacity);

    let workers = tokio::spawn(run_workers(app.executor.clone(), rx, engine.workers));
    let dispatcher = tokio::spawn(Arc::clone(&app.dispatcher).run(tx, cancel.clone()));
    let replan = tokio::spawn(run_daily_replan(app.service.clone(), cancel.clone()));
    let control = tokio::spawn(run_control_loop(
        app.service.clone(),
        Duration::from_secs(engine.control_poll_secs),
        cancel.clone(),
    ));

    app.status.emit(StatusEvent::ServiceStartup).await;
    info!(workers = engine.workers, "pinbot running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    app.service.stop_all().await;
    cancel.cancel();
    let _ = dispatcher.await;
    let _ = replan.await;
    let _ = control.await;
    // The dispatcher owned the only sender, so the pool drains and exits.
    let _ = workers.await;

    app.status.emit(StatusEvent::ServiceShutdown).await;
    Ok(())
}
