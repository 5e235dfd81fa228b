//! Quota agent - Periodically enforces the session time limit
//!
//! Runs next to the coordinator and asks it to evaluate the time limit at a
//! fixed interval. The first check happens one interval after start.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::base::{Agent, AgentError, AgentStatus};
use crate::config::AppConfig;
use crate::coordinator::CoordinatorHandle;

/// Configuration for the quota agent
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Interval between time-limit checks
    pub interval: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl QuotaConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::with_interval_seconds(config.quota_check_interval_secs)
    }

    /// Zero is clamped to one second
    pub fn with_interval_seconds(seconds: u64) -> Self {
        Self {
            interval: Duration::from_secs(seconds.max(1)),
        }
    }
}

/// Agent that disables automation once a session runs out of time
pub struct QuotaAgent {
    config: QuotaConfig,
    coordinator: CoordinatorHandle,
    status: RwLock<AgentStatus>,
    cancel_token: Mutex<CancellationToken>,
}

impl QuotaAgent {
    pub fn new(coordinator: CoordinatorHandle) -> Self {
        Self::with_config(coordinator, QuotaConfig::default())
    }

    pub fn with_config(coordinator: CoordinatorHandle, config: QuotaConfig) -> Self {
        Self {
            config,
            coordinator,
            status: RwLock::new(AgentStatus::Idle),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    async fn check(&self) -> Result<bool, AgentError> {
        match self.coordinator.evaluate_time_limit().await {
            Ok(tripped) => {
                if tripped {
                    tracing::info!("Quota agent disabled automation");
                }
                Ok(tripped)
            }
            Err(e) => {
                tracing::warn!("Time limit check failed: {}", e);
                Err(AgentError::OperationFailed(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Agent for QuotaAgent {
    fn id(&self) -> &'static str {
        "quota"
    }

    fn name(&self) -> &'static str {
        "Quota Agent"
    }

    fn status(&self) -> AgentStatus {
        self.status
            .try_read()
            .map(|s| s.clone())
            .unwrap_or(AgentStatus::Idle)
    }

    async fn start(&self) -> Result<(), AgentError> {
        let token = {
            let mut status = self.status.write().await;
            if status.is_running() {
                return Err(AgentError::AlreadyRunning);
            }
            *status = AgentStatus::Running;

            // Tokens can't be reset, so every run gets its own
            let token = CancellationToken::new();
            *self.cancel_token.lock().await = token.clone();
            token
        };

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("Quota agent cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    // Failures are logged; the next tick tries again
                    let _ = self.check().await;
                }
            }
        }

        *self.status.write().await = AgentStatus::Stopped;
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        if !self.status.read().await.is_running() {
            return Ok(());
        }
        self.cancel_token.lock().await.cancel();
        Ok(())
    }

    async fn trigger(&self) -> Result<(), AgentError> {
        self.check().await.map(|_| ())
    }
}
