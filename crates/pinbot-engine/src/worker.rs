//! Background loops: the bounded worker pool fed by the dispatcher, the
//! daily re-plan, and the control loop that applies queued admin requests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pinbot_cron::ScheduledJob;
use pinbot_types::{ControlAction, ControlRequest};

use crate::executor::ActionExecutor;
use crate::service::AgentService;

/// Run fired jobs with at most `workers` cycles in flight. Returns once the
/// queue is closed and every started cycle has finished.
pub async fn run_workers(
    executor: Arc<ActionExecutor>,
    mut jobs: mpsc::Receiver<ScheduledJob>,
    workers: usize,
) {
    let limit = Arc::new(Semaphore::new(workers.max(1)));
    let mut running = JoinSet::new();
    info!(workers, "Worker pool started");

    while let Some(job) = jobs.recv().await {
        let Ok(permit) = limit.clone().acquire_owned().await else {
            break;
        };
        let executor = executor.clone();
        running.spawn(async move {
            let _permit = permit;
            match executor.run_cycle(&job.agent_id).await {
                Ok(report) if report.busy => {}
                Ok(report) => info!(
                    agent_id = %job.agent_id,
                    actions = report.executed.len(),
                    "Job completed"
                ),
                Err(e) => warn!(agent_id = %job.agent_id, key = %job.key, "Job failed: {e}"),
            }
        });
        while let Some(done) = running.try_join_next() {
            if let Err(e) = done {
                warn!("Worker task aborted: {e}");
            }
        }
    }

    while let Some(done) = running.join_next().await {
        if let Err(e) = done {
            warn!("Worker task aborted: {e}");
        }
    }
    info!("Worker pool drained");
}

/// Re-plan every agent shortly after each local midnight until cancelled.
pub async fn run_daily_replan(service: Arc<AgentService>, cancel: CancellationToken) {
    loop {
        let wait = until_next_replan(Local::now());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        match service.reschedule_all().await {
            Ok(total) => info!(total, "Daily re-plan scheduled jobs"),
            Err(e) => warn!("Daily re-plan failed: {e}"),
        }
    }
}

/// Apply queued control requests every `every` until cancelled. The queue is
/// drained once on entry so requests made while no service ran are honored.
pub async fn run_control_loop(
    service: Arc<AgentService>,
    every: Duration,
    cancel: CancellationToken,
) {
    info!(every_secs = every.as_secs(), "Control loop started");
    loop {
        match service.take_control_requests().await {
            Ok(requests) => {
                for request in requests {
                    apply_control(&service, request).await;
                }
            }
            Err(e) => warn!("Failed to read control requests: {e}"),
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(every) => {}
        }
    }
    info!("Control loop stopped");
}

async fn apply_control(service: &Arc<AgentService>, request: ControlRequest) {
    let ControlRequest {
        id,
        agent_id,
        action,
        ..
    } = request;
    info!(id, agent_id = %agent_id, action = action.as_str(), "Applying control request");
    let outcome = match action {
        ControlAction::Schedule => service.start_agent(&agent_id).await.map(|_| ()),
        ControlAction::Stop => service.stop_agent(&agent_id).await.map(|_| ()),
        ControlAction::Delete => service.delete_agent(&agent_id).await.map(|_| ()),
        ControlAction::RunNow => {
            let service = service.clone();
            tokio::spawn(async move {
                match service.run_now(&agent_id).await {
                    Ok(report) if report.busy => {
                        info!(agent_id = %agent_id, "Run-now skipped, cycle already running")
                    }
                    Ok(report) => info!(
                        agent_id = %agent_id,
                        actions = report.executed.len(),
                        "Run-now completed"
                    ),
                    Err(e) => warn!(agent_id = %agent_id, "Run-now failed: {e}"),
                }
            });
            Ok(())
        }
    };
    if let Err(e) = outcome {
        warn!(id, action = action.as_str(), "Control request failed: {e}");
    }
}

/// Time from `now` to 00:00:05 on the next local day.
pub fn until_next_replan(now: DateTime<Local>) -> Duration {
    let fallback = Duration::from_secs(3600);
    let Some(tomorrow) = now.date_naive().succ_opt() else {
        return fallback;
    };
    let target = tomorrow.and_time(NaiveTime::from_hms_opt(0, 0, 5).unwrap_or(NaiveTime::MIN));
    match target.and_local_timezone(Local).earliest() {
        Some(at) => (at - now).to_std().unwrap_or(fallback),
        None => fallback,
    }
}
