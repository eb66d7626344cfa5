//! pinbot-cron: Daily activity planning and one-shot job dispatch.
//!
//! The planner turns an agent's declared intervals into concrete fire
//! times; the dispatcher holds those times in a min-heap and hands each
//! due job to the worker queue exactly once.

pub mod dispatcher;
pub mod planner;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A one-shot unit of work: run one cycle for `agent_id` at `fire_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Unique per (agent, fire time) pair.
    pub key: String,
    pub agent_id: String,
    pub fire_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(agent_id: impl Into<String>, fire_at: DateTime<Utc>) -> Self {
        let agent_id = agent_id.into();
        Self {
            key: job_key(&agent_id, fire_at),
            agent_id,
            fire_at,
        }
    }
}

/// Job key for an agent firing at `fire_at`.
pub fn job_key(agent_id: &str, fire_at: DateTime<Utc>) -> String {
    format!("agentJob_{agent_id}_{}", fire_at.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_key_is_unique_per_agent_and_time() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 9, 15, 0).unwrap();
        let a = ScheduledJob::new("a1", t);
        assert_eq!(a.key, job_key("a1", t));
        assert_ne!(a.key, job_key("a2", t));
        assert_ne!(a.key, job_key("a1", t + chrono::Duration::seconds(1)));
    }
}
