//! AutoPrompter - Keeps a chat session going within a time and prompt budget
//!
//! A coordinator owns the settings and the usage record of the current
//! session and decides whether automation may continue. Page-resident agents
//! periodically fill the chat input with a configured prompt and submit it.
//!
//! ## Architecture
//!
//! - **Coordinator**: single-writer actor over the persisted records
//! - **Quota**: pure permission and session-phase rules
//! - **Agents**: the periodic quota check and the injection loop
//! - **Page**: capability traits the injection agent drives
//! - **Host**: newline-delimited JSON bridge used by the daemon
//! - **Storage**: `sync` and `local` key-value areas, file or memory backed
//! - **Security**: sanitization of URLs and prompt text before logging

pub mod agents;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod host;
pub mod page;
pub mod protocol;
pub mod quota;
pub mod security;
pub mod storage;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use agents::{AgentManager, InjectionConfig, QuotaAgent, QuotaConfig};
use clock::SystemClock;
use config::AppConfig;
use coordinator::{Coordinator, CoordinatorError, CoordinatorHandle};
use storage::Storage;

/// State shared by the daemon
pub struct AppState {
    /// Agent manager for background tasks
    pub agent_manager: AgentManager,
    /// Address of the running coordinator
    pub coordinator: CoordinatorHandle,
    /// Timing handed to page agents that attach to this coordinator
    pub injection_config: InjectionConfig,
}

impl AppState {
    /// Starts the coordinator over `storage` and registers the quota agent
    pub async fn new(storage: Storage, config: &AppConfig) -> Result<Self, CoordinatorError> {
        let coordinator = Coordinator::new(storage, Arc::new(SystemClock))
            .start()
            .await?;
        let agent_manager = AgentManager::new();

        let quota = QuotaAgent::with_config(
            coordinator.clone(),
            QuotaConfig::from_app_config(config),
        );
        agent_manager.register(Arc::new(quota)).await;

        Ok(Self {
            agent_manager,
            coordinator,
            injection_config: InjectionConfig::from_app_config(config),
        })
    }
}

/// Installs the stderr subscriber; stdout is the protocol channel
pub fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("autoprompter_lib=debug".parse()?)
        .add_directive("info".parse()?);

    // A subscriber may already be installed by an embedding application
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}

/// Runs the coordinator daemon on stdin/stdout until the host closes stdin
pub async fn run(config: AppConfig, in_memory: bool) -> anyhow::Result<()> {
    tracing::info!("Starting AutoPrompter...");

    let storage = if in_memory {
        Storage::in_memory()
    } else {
        let dir = config
            .resolved_data_dir()
            .context("Could not determine a data directory")?;
        tracing::info!("Using data directory {}", dir.display());
        Storage::in_dir(&dir)
    };

    let state = AppState::new(storage, &config)
        .await
        .context("Failed to start the coordinator")?;
    state.agent_manager.start_all().await;
    tracing::info!("AutoPrompter initialized successfully");

    let served = host::serve(
        state.coordinator.clone(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    state.agent_manager.stop_all().await;
    served.context("Host bridge failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agents::AgentStatus;

    #[tokio::test]
    async fn test_app_state_registers_quota_agent() {
        let state = AppState::new(Storage::in_memory(), &AppConfig::default())
            .await
            .unwrap();

        assert_eq!(state.agent_manager.agent_count().await, 1);
        assert_eq!(
            state.agent_manager.status().await.get("quota"),
            Some(&AgentStatus::Idle)
        );
        assert!(!state.coordinator.check_permission().await);
    }

    #[tokio::test]
    async fn test_app_state_takes_intervals_from_config() {
        let config = AppConfig {
            injection_interval_secs: 12,
            ..AppConfig::default()
        };
        let state = AppState::new(Storage::in_memory(), &config).await.unwrap();

        assert_eq!(
            state.injection_config.interval,
            std::time::Duration::from_secs(12)
        );
        assert!(!state.injection_config.check_permission_each_cycle);
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging().unwrap();
        init_logging().unwrap();
    }
}
