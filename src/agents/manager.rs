//! Agent manager - Runs the coordinator's background agents
//!
//! Spawns each registered agent's loop on the runtime and stops them on
//! shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::base::{Agent, AgentStatus};

/// How long `stop_all` waits for a loop before aborting it
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct Registered {
    agent: Arc<dyn Agent>,
    handle: Option<JoinHandle<()>>,
}

/// Manages the lifecycle of background agents
#[derive(Default)]
pub struct AgentManager {
    agents: RwLock<HashMap<&'static str, Registered>>,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent; replaces (and stops) any agent with the same id
    pub async fn register(&self, agent: Arc<dyn Agent>) {
        let previous = self.agents.write().await.insert(
            agent.id(),
            Registered {
                agent,
                handle: None,
            },
        );

        if let Some(previous) = previous {
            Self::shutdown(previous).await;
        }
    }

    /// Spawns every registered agent that is not already running
    pub async fn start_all(&self) {
        let mut agents = self.agents.write().await;

        for (id, entry) in agents.iter_mut() {
            if entry.handle.as_ref().is_some_and(|h| !h.is_finished()) {
                continue;
            }

            let agent = Arc::clone(&entry.agent);
            entry.handle = Some(tokio::spawn(async move {
                if let Err(e) = agent.start().await {
                    tracing::error!("Agent '{}' error: {}", agent.id(), e);
                }
            }));
            tracing::info!("Started agent: {}", id);
        }
    }

    /// Stops every agent and waits for its loop to wind down
    pub async fn stop_all(&self) {
        let entries: Vec<Registered> = self
            .agents
            .write()
            .await
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in entries {
            let agent = Arc::clone(&entry.agent);
            Self::shutdown(entry).await;
            self.agents.write().await.insert(
                agent.id(),
                Registered {
                    agent,
                    handle: None,
                },
            );
        }
    }

    async fn shutdown(entry: Registered) {
        let id = entry.agent.id();
        if let Err(e) = entry.agent.stop().await {
            tracing::warn!("Failed to stop agent '{}': {}", id, e);
        }
        if let Some(mut handle) = entry.handle {
            match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Agent '{}' task ended abnormally: {}", id, e),
                Err(_) => {
                    tracing::warn!("Agent '{}' did not stop in time, aborting", id);
                    handle.abort();
                }
            }
        }
        tracing::info!("Stopped agent: {}", id);
    }

    /// Gets the status of all agents
    pub async fn status(&self) -> HashMap<&'static str, AgentStatus> {
        self.agents
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, entry.agent.status()))
            .collect()
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }
}
