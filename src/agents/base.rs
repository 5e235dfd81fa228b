//! Base agent trait and types
//!
//! Defines the Agent trait shared by the coordinator's quota agent and the
//! per-page injection agents.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur in agents
#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    /// Agent is already running
    #[error("Agent is already running")]
    AlreadyRunning,

    /// Automation is switched off in settings
    #[error("Automation is disabled")]
    Disabled,

    /// An injection cycle is still in flight
    #[error("Agent is busy")]
    Busy,

    /// Agent operation failed
    #[error("Agent operation failed: {0}")]
    OperationFailed(String),
}

/// Status of an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    /// Agent is idle and not running
    Idle,
    /// Agent is currently running
    Running,
    /// Agent encountered an error
    Error(String),
    /// Agent has been stopped
    Stopped,
}

impl AgentStatus {
    /// Returns true if the agent is running
    pub fn is_running(&self) -> bool {
        matches!(self, AgentStatus::Running)
    }
}

/// Trait for long-running agents
///
/// `start` runs the agent's loop until `stop` cancels it.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the unique identifier for this agent
    fn id(&self) -> &'static str;

    /// Returns the display name for this agent
    fn name(&self) -> &'static str;

    /// Returns the current status of the agent
    fn status(&self) -> AgentStatus;

    /// Runs the agent's main loop until cancelled
    ///
    /// Implementations should use tokio::select! with a cancellation token.
    async fn start(&self) -> Result<(), AgentError>;

    /// Signals the agent to stop
    async fn stop(&self) -> Result<(), AgentError>;

    /// Performs one unit of the agent's work immediately
    async fn trigger(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_status_is_running() {
        assert!(AgentStatus::Running.is_running());
        assert!(!AgentStatus::Idle.is_running());
        assert!(!AgentStatus::Stopped.is_running());
        assert!(!AgentStatus::Error("test".into()).is_running());
    }

    #[test]
    fn test_agent_error_messages() {
        assert_eq!(AgentError::Disabled.to_string(), "Automation is disabled");
        assert_eq!(
            AgentError::OperationFailed("boom".into()).to_string(),
            "Agent operation failed: boom"
        );
    }
}
