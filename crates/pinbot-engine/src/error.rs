use pinbot_cron::planner::PlanError;
use pinbot_storage::StorageError;

use crate::backend::BackendError;
use crate::selection::SelectionError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "unknown function `{}`, expected one of: {}",
        .0,
        crate::command::registered_names()
    )]
    UnknownFunction(String),
    #[error("invalid schedule: {0}")]
    Schedule(#[from] PlanError),
    #[error("invalid agent: {0}")]
    InvalidAgent(String),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("agent {agent_id} could not authenticate: {source}")]
    Auth {
        agent_id: String,
        #[source]
        source: BackendError,
    },
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("selection error: {0}")]
    Selection(#[from] SelectionError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Dispatch(#[from] anyhow::Error),
    #[error("cycle panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Errors caused by an agent's declared configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownFunction(_)
                | EngineError::Schedule(_)
                | EngineError::InvalidAgent(_)
        )
    }

    /// Errors that skip one step or function but let the cycle continue.
    pub fn is_step_local(&self) -> bool {
        matches!(self, EngineError::Backend(_) | EngineError::Selection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(EngineError::UnknownFunction("FOO".into()).is_config_error());
        assert!(EngineError::Schedule(PlanError::NonPositiveRate(0)).is_config_error());
        assert!(EngineError::Backend(BackendError::Transport("reset".into())).is_step_local());
        assert!(EngineError::Selection(SelectionError::Unparseable("?".into())).is_step_local());

        let auth = EngineError::Auth {
            agent_id: "a".into(),
            source: BackendError::Auth("401".into()),
        };
        assert!(!auth.is_step_local());
        assert!(!auth.is_config_error());
    }
}
