//! Status event types.

use serde::{Deserialize, Serialize};

/// Channel carrying `"<agent id>:Online"` / `"<agent id>:Offline"`.
pub const AGENT_STATUS: &str = "agent_status";
/// Channel carrying free-text agent activity.
pub const AGENT_LOGS: &str = "agent_logs";
/// Channel carrying service lifecycle notices.
pub const SERVICE: &str = "service";

/// Events published to the status sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// The service has started.
    ServiceStartup,
    /// The service is shutting down.
    ServiceShutdown,
    /// An agent entered a cycle.
    AgentOnline { agent_id: String },
    /// An agent left a cycle.
    AgentOffline { agent_id: String },
    /// Free-text activity line for one agent.
    AgentLog { agent_id: String, message: String },
}

impl StatusEvent {
    pub fn log(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentLog {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    /// Channel this event is routed on.
    pub fn channel(&self) -> &'static str {
        match self {
            StatusEvent::ServiceStartup | StatusEvent::ServiceShutdown => SERVICE,
            StatusEvent::AgentOnline { .. } | StatusEvent::AgentOffline { .. } => AGENT_STATUS,
            StatusEvent::AgentLog { .. } => AGENT_LOGS,
        }
    }

    /// Wire message for the channel.
    pub fn message(&self) -> String {
        match self {
            StatusEvent::ServiceStartup => "startup".to_string(),
            StatusEvent::ServiceShutdown => "shutdown".to_string(),
            StatusEvent::AgentOnline { agent_id } => format!("{agent_id}:Online"),
            StatusEvent::AgentOffline { agent_id } => format!("{agent_id}:Offline"),
            StatusEvent::AgentLog { message, .. } => message.clone(),
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            StatusEvent::ServiceStartup | StatusEvent::ServiceShutdown => None,
            StatusEvent::AgentOnline { agent_id }
            | StatusEvent::AgentOffline { agent_id }
            | StatusEvent::AgentLog { agent_id, .. } => Some(agent_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages() {
        let online = StatusEvent::AgentOnline {
            agent_id: "a1".into(),
        };
        assert_eq!(online.channel(), AGENT_STATUS);
        assert_eq!(online.message(), "a1:Online");

        let offline = StatusEvent::AgentOffline {
            agent_id: "a1".into(),
        };
        assert_eq!(offline.message(), "a1:Offline");

        let log = StatusEvent::log("a1", "no interesting items on page 3");
        assert_eq!(log.channel(), AGENT_LOGS);
        assert_eq!(log.agent_id(), Some("a1"));
        assert_eq!(StatusEvent::ServiceStartup.agent_id(), None);
    }
}
