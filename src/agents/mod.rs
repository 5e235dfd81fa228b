//! Agent module - Background tasks and periodic operations
//!
//! Provides agents for:
//! - Periodic enforcement of the session time limit
//! - Prompt injection on a chat page

mod base;
mod injection_agent;
mod manager;
mod quota_agent;

pub use base::{Agent, AgentError, AgentStatus};
pub use injection_agent::{InjectionAgent, InjectionConfig, InjectionError, InjectionOutcome};
pub use manager::AgentManager;
pub use quota_agent::{QuotaAgent, QuotaConfig};
