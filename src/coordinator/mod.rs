//! Coordinator - Owner of the settings and usage records
//!
//! The [`Coordinator`] holds the storage areas and implements every quota
//! operation. It is never shared directly: [`Coordinator::start`] moves it
//! into an actor task and hands out [`CoordinatorHandle`]s, so all reads and
//! writes are serialized through one queue.

mod handle;

pub use handle::{CoordinatorClient, CoordinatorHandle};

#[cfg(test)]
pub use handle::MockCoordinatorClient;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::config::{Settings, SettingsError};
use crate::protocol::{AgentNotice, Request, Response};
use crate::quota::{self, SessionSummary, UsageData};
use crate::security::Sanitizer;
use crate::storage::{self, Storage, StoreError, SETTINGS_KEY, USAGE_KEY};

/// Capacity of the agent notice channel
const NOTICE_CAPACITY: usize = 32;

/// Errors that can occur in coordinator operations
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Reading or writing a record failed
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// A settings record was rejected
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),

    /// The actor task is gone
    #[error("Coordinator unavailable")]
    Unavailable,
}

/// Canonical owner of [`Settings`] and [`UsageData`]
pub struct Coordinator {
    storage: Storage,
    clock: Arc<dyn Clock>,
    notices: broadcast::Sender<AgentNotice>,
}

impl Coordinator {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            storage,
            clock,
            notices,
        }
    }

    /// Populates missing records, then moves the coordinator into its actor task
    pub async fn start(self) -> Result<CoordinatorHandle, CoordinatorError> {
        self.initialize().await?;
        Ok(handle::spawn(self))
    }

    /// One-time default population for a first run
    pub async fn initialize(&self) -> Result<(), CoordinatorError> {
        if self.get_settings().await?.is_none() {
            tracing::info!("No settings stored, writing defaults");
            self.write_settings(&Settings::default()).await?;
        }

        if self.get_usage_data().await?.is_none() {
            tracing::info!("No usage data stored, starting a fresh session");
            self.reset_session().await?;
        }

        Ok(())
    }

    /// Subscribes to notices pushed to page agents
    pub fn subscribe(&self) -> broadcast::Receiver<AgentNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notice_sender(&self) -> broadcast::Sender<AgentNotice> {
        self.notices.clone()
    }

    pub async fn get_settings(&self) -> Result<Option<Settings>, CoordinatorError> {
        Ok(storage::read_record(self.storage.sync(), SETTINGS_KEY).await?)
    }

    /// Validates and replaces the settings record wholesale
    pub async fn save_settings(&self, settings: Settings) -> Result<(), CoordinatorError> {
        settings.validate()?;
        self.write_settings(&settings).await?;
        tracing::debug!(
            "Saved settings: enabled={}, time_limit={}m, prompt_limit={}, sites={}",
            settings.is_enabled,
            settings.time_limit_minutes,
            settings.prompt_limit,
            settings.allowed_sites.len()
        );
        Ok(())
    }

    async fn write_settings(&self, settings: &Settings) -> Result<(), CoordinatorError> {
        Ok(storage::write_record(self.storage.sync(), SETTINGS_KEY, settings).await?)
    }

    pub async fn get_usage_data(&self) -> Result<Option<UsageData>, CoordinatorError> {
        Ok(storage::read_record(self.storage.local(), USAGE_KEY).await?)
    }

    async fn write_usage(&self, usage: &UsageData) -> Result<(), CoordinatorError> {
        Ok(storage::write_record(self.storage.local(), USAGE_KEY, usage).await?)
    }

    /// Pure read: enabled, under the prompt limit and under the time limit
    pub async fn check_permission(&self) -> Result<bool, CoordinatorError> {
        let settings = self.get_settings().await?;
        let usage = self.get_usage_data().await?;
        Ok(quota::can_use(
            settings.as_ref(),
            usage.as_ref(),
            self.clock.now_millis(),
        ))
    }

    /// Counts one submission. No bound check; the next permission check denies.
    pub async fn record_submission(&self) -> Result<Option<UsageData>, CoordinatorError> {
        let Some(mut usage) = self.get_usage_data().await? else {
            tracing::warn!("Submission recorded before any session exists, ignoring");
            return Ok(None);
        };

        usage.record_submission(self.clock.now_millis());
        self.write_usage(&usage).await?;
        tracing::debug!("Recorded submission #{}", usage.prompt_count);
        Ok(Some(usage))
    }

    /// Starts a fresh session at the current instant
    pub async fn reset_session(&self) -> Result<UsageData, CoordinatorError> {
        let usage = UsageData::fresh(self.clock.now_millis());
        self.write_usage(&usage).await?;
        tracing::info!("Session reset");
        Ok(usage)
    }

    pub async fn session_summary(&self) -> Result<Option<SessionSummary>, CoordinatorError> {
        let settings = self.get_settings().await?;
        let usage = self.get_usage_data().await?;
        Ok(match (settings, usage) {
            (Some(settings), Some(usage)) => Some(SessionSummary::new(
                &settings,
                &usage,
                self.clock.now_millis(),
            )),
            _ => None,
        })
    }

    /// Periodic check: once an enabled session has used up its time, disables
    /// automation and tells every agent.
    ///
    /// One-way; nothing here ever sets `is_enabled` back to true. Returns true
    /// when the limit tripped on this call.
    pub async fn evaluate_time_limit(&self) -> Result<bool, CoordinatorError> {
        let (Some(mut settings), Some(usage)) =
            (self.get_settings().await?, self.get_usage_data().await?)
        else {
            return Ok(false);
        };

        if !settings.is_enabled || !quota::time_exhausted(&settings, &usage, self.clock.now_millis())
        {
            return Ok(false);
        }

        settings.is_enabled = false;
        self.write_settings(&settings).await?;
        tracing::info!(
            "Session time limit of {} minutes exceeded, automation disabled",
            settings.time_limit_minutes
        );
        self.broadcast(AgentNotice::TimeLimitExceeded);
        Ok(true)
    }

    /// Reacts to a completed page load; while automation is enabled, resets
    /// the session when `url` is off the allow-list. Returns true if a reset
    /// happened.
    pub async fn handle_navigation(&self, url: &str) -> Result<bool, CoordinatorError> {
        let Some(settings) = self.get_settings().await? else {
            return Ok(false);
        };
        if !settings.is_enabled {
            return Ok(false);
        }

        if quota::is_allowed_site(&settings.allowed_sites, url) {
            return Ok(false);
        }

        tracing::info!(
            "Navigated to {} outside the allowed sites",
            Sanitizer::sanitize_url(url)
        );
        self.reset_session().await?;
        Ok(true)
    }

    /// Fire-and-forget delivery to every subscribed agent
    pub fn broadcast(&self, notice: AgentNotice) {
        if self.notices.send(notice).is_err() {
            tracing::debug!("No agents listening for {:?}", notice);
        }
    }

    /// Answers one protocol request; failures become error responses
    pub async fn handle(&self, request: Request) -> Response {
        let action = request.action();
        let result = match request {
            Request::GetSettings => self
                .get_settings()
                .await
                .map(|s| Response::with_data(s.as_ref())),
            Request::SaveSettings { settings } => self.save_settings(settings).await.map(|()| {
                self.broadcast(AgentNotice::SettingsUpdated);
                Response::ok()
            }),
            Request::CheckPermission => self.check_permission().await.map(Response::permission),
            Request::RecordUsage => self.record_submission().await.map(|_| Response::ok()),
            Request::GetUsageData => self
                .get_usage_data()
                .await
                .map(|u| Response::with_data(u.as_ref())),
            Request::ResetUsage => self.reset_session().await.map(|_| Response::ok()),
            Request::GetSessionSummary => self
                .session_summary()
                .await
                .map(|s| Response::with_data(s.as_ref())),
        };

        result.unwrap_or_else(|e| {
            tracing::error!("Coordinator error handling '{}': {}", action, e);
            Response::failure(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::KeyValueStore;
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000;

    fn coordinator() -> (Coordinator, Arc<ManualClock>, Storage) {
        let clock = Arc::new(ManualClock::new(T0));
        let storage = Storage::in_memory();
        (
            Coordinator::new(storage.clone(), clock.clone()),
            clock,
            storage,
        )
    }

    async fn enabled(coordinator: &Coordinator, time_limit: u32, prompt_limit: u32) {
        let settings = Settings {
            is_enabled: true,
            time_limit_minutes: time_limit,
            prompt_limit,
            allowed_sites: vec!["https://a.com".into()],
            ..Settings::default()
        };
        coordinator.save_settings(settings).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_populates_defaults() {
        let (coordinator, _clock, _) = coordinator();
        assert!(coordinator.get_settings().await.unwrap().is_none());
        assert!(coordinator.get_usage_data().await.unwrap().is_none());

        coordinator.initialize().await.unwrap();

        assert_eq!(
            coordinator.get_settings().await.unwrap(),
            Some(Settings::default())
        );
        assert_eq!(
            coordinator.get_usage_data().await.unwrap(),
            Some(UsageData::fresh(T0))
        );
    }

    #[tokio::test]
    async fn test_initialize_keeps_existing_records() {
        let (coordinator, clock, _) = coordinator();
        enabled(&coordinator, 5, 5).await;
        coordinator.initialize().await.unwrap();
        coordinator.record_submission().await.unwrap();

        clock.advance(Duration::from_secs(1));
        coordinator.initialize().await.unwrap();

        let settings = coordinator.get_settings().await.unwrap().unwrap();
        assert!(settings.is_enabled);
        let usage = coordinator.get_usage_data().await.unwrap().unwrap();
        assert_eq!(usage.prompt_count, 1);
    }

    #[tokio::test]
    async fn test_save_settings_rejects_invalid() {
        let (coordinator, _clock, _) = coordinator();
        coordinator.initialize().await.unwrap();

        let bad = Settings {
            prompt_limit: 0,
            ..Settings::default()
        };
        let err = coordinator.save_settings(bad).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidSettings(_)));
        assert_eq!(
            coordinator.get_settings().await.unwrap(),
            Some(Settings::default())
        );
    }

    #[tokio::test]
    async fn test_record_submission_increments_and_stamps() {
        let (coordinator, clock, _) = coordinator();
        coordinator.initialize().await.unwrap();

        clock.advance(Duration::from_secs(3));
        let usage = coordinator.record_submission().await.unwrap().unwrap();
        assert_eq!(usage.prompt_count, 1);
        assert_eq!(usage.last_used, T0 + 3_000);

        clock.advance(Duration::from_secs(3));
        let usage = coordinator.record_submission().await.unwrap().unwrap();
        assert_eq!(usage.prompt_count, 2);
        assert_eq!(usage.last_used, T0 + 6_000);
        assert_eq!(usage.session_start_time, T0);
    }

    #[tokio::test]
    async fn test_record_submission_without_session_is_noop() {
        let (coordinator, _clock, _) = coordinator();
        assert!(coordinator.record_submission().await.unwrap().is_none());
        assert!(coordinator.get_usage_data().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_session_is_idempotent_at_same_instant() {
        let (coordinator, clock, _) = coordinator();
        coordinator.initialize().await.unwrap();
        coordinator.record_submission().await.unwrap();

        clock.advance(Duration::from_secs(10));
        let first = coordinator.reset_session().await.unwrap();
        let second = coordinator.reset_session().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, UsageData::fresh(T0 + 10_000));
    }

    #[tokio::test]
    async fn test_time_limit_denies_before_prompt_limit() {
        let (coordinator, clock, _) = coordinator();
        enabled(&coordinator, 1, 10).await;
        coordinator.initialize().await.unwrap();

        coordinator.record_submission().await.unwrap();
        assert!(coordinator.check_permission().await.unwrap());

        clock.advance(Duration::from_secs(61));
        assert!(!coordinator.check_permission().await.unwrap());
    }

    #[tokio::test]
    async fn test_prompt_limit_denies_regardless_of_time() {
        let (coordinator, _clock, _) = coordinator();
        enabled(&coordinator, 60, 2).await;
        coordinator.initialize().await.unwrap();

        coordinator.record_submission().await.unwrap();
        assert!(coordinator.check_permission().await.unwrap());
        coordinator.record_submission().await.unwrap();
        assert!(!coordinator.check_permission().await.unwrap());
    }

    #[tokio::test]
    async fn test_check_permission_has_no_side_effects() {
        let (coordinator, clock, _) = coordinator();
        enabled(&coordinator, 1, 10).await;
        coordinator.initialize().await.unwrap();
        clock.advance(Duration::from_secs(120));

        let settings_before = coordinator.get_settings().await.unwrap();
        let usage_before = coordinator.get_usage_data().await.unwrap();
        assert!(!coordinator.check_permission().await.unwrap());
        assert_eq!(coordinator.get_settings().await.unwrap(), settings_before);
        assert_eq!(coordinator.get_usage_data().await.unwrap(), usage_before);
    }

    #[tokio::test]
    async fn test_evaluate_time_limit_disables_once() {
        let (coordinator, clock, _) = coordinator();
        enabled(&coordinator, 1, 10).await;
        coordinator.initialize().await.unwrap();
        let mut notices = coordinator.subscribe();

        clock.advance(Duration::from_secs(30));
        assert!(!coordinator.evaluate_time_limit().await.unwrap());
        assert!(coordinator.get_settings().await.unwrap().unwrap().is_enabled);

        clock.advance(Duration::from_secs(30));
        assert!(coordinator.evaluate_time_limit().await.unwrap());
        assert!(!coordinator.get_settings().await.unwrap().unwrap().is_enabled);
        assert_eq!(notices.try_recv().unwrap(), AgentNotice::TimeLimitExceeded);

        // Stays disabled, even after a reset brings time back under the limit
        coordinator.reset_session().await.unwrap();
        assert!(!coordinator.evaluate_time_limit().await.unwrap());
        assert!(!coordinator.get_settings().await.unwrap().unwrap().is_enabled);
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_evaluate_time_limit_ignores_disabled() {
        let (coordinator, clock, _) = coordinator();
        coordinator.initialize().await.unwrap();
        clock.advance(Duration::from_secs(24 * 3600));
        assert!(!coordinator.evaluate_time_limit().await.unwrap());
    }

    #[tokio::test]
    async fn test_evaluate_time_limit_without_listeners() {
        let (coordinator, clock, _) = coordinator();
        enabled(&coordinator, 1, 10).await;
        coordinator.initialize().await.unwrap();
        clock.advance(Duration::from_secs(90));
        assert!(coordinator.evaluate_time_limit().await.unwrap());
    }

    #[tokio::test]
    async fn test_navigation_off_allow_list_resets() {
        let (coordinator, clock, _) = coordinator();
        enabled(&coordinator, 60, 10).await;
        coordinator.initialize().await.unwrap();
        coordinator.record_submission().await.unwrap();
        coordinator.record_submission().await.unwrap();

        assert!(!coordinator.handle_navigation("https://a.com/chat").await.unwrap());
        assert_eq!(
            coordinator.get_usage_data().await.unwrap().unwrap().prompt_count,
            2
        );

        clock.advance(Duration::from_secs(5));
        assert!(coordinator.handle_navigation("https://b.com/x?q=1").await.unwrap());
        assert_eq!(
            coordinator.get_usage_data().await.unwrap(),
            Some(UsageData::fresh(T0 + 5_000))
        );
    }

    #[tokio::test]
    async fn test_navigation_while_disabled_keeps_session() {
        let (coordinator, _clock, _) = coordinator();
        coordinator.initialize().await.unwrap();
        coordinator.record_submission().await.unwrap();

        assert!(!coordinator.handle_navigation("https://example.com/").await.unwrap());
        assert_eq!(
            coordinator.get_usage_data().await.unwrap().unwrap().prompt_count,
            1
        );
    }

    #[tokio::test]
    async fn test_navigation_without_settings_is_ignored() {
        let (coordinator, _clock, _) = coordinator();
        assert!(!coordinator.handle_navigation("https://b.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_handle_get_settings_absent_is_null() {
        let (coordinator, _clock, _) = coordinator();
        let response = coordinator.handle(Request::GetSettings).await;
        assert!(response.success);
        assert_eq!(response.data, Some(serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_handle_save_settings_broadcasts_update() {
        let (coordinator, _clock, _) = coordinator();
        coordinator.initialize().await.unwrap();
        let mut notices = coordinator.subscribe();

        let settings = Settings {
            custom_prompt: "more".into(),
            ..Settings::default()
        };
        let response = coordinator
            .handle(Request::SaveSettings {
                settings: settings.clone(),
            })
            .await;

        assert_eq!(response, Response::ok());
        assert_eq!(notices.try_recv().unwrap(), AgentNotice::SettingsUpdated);
        assert_eq!(coordinator.get_settings().await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn test_handle_invalid_settings_is_error_response() {
        let (coordinator, _clock, _) = coordinator();
        coordinator.initialize().await.unwrap();
        let mut notices = coordinator.subscribe();

        let response = coordinator
            .handle(Request::SaveSettings {
                settings: Settings {
                    time_limit_minutes: 0,
                    ..Settings::default()
                },
            })
            .await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("Time limit"));
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_storage_failure_is_error_response() {
        use async_trait::async_trait;
        use serde_json::Value;

        struct BrokenStore;

        #[async_trait]
        impl KeyValueStore for BrokenStore {
            async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
                Err(StoreError::Corrupt("broken".into()))
            }

            async fn set(&self, _key: &str, _value: Value) -> Result<(), StoreError> {
                Err(StoreError::Corrupt("broken".into()))
            }
        }

        let storage = Storage::new(Arc::new(BrokenStore), Arc::new(BrokenStore));
        let coordinator = Coordinator::new(storage, Arc::new(ManualClock::new(T0)));

        let response = coordinator.handle(Request::CheckPermission).await;
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Corrupt storage area: broken")
        );
    }

    #[tokio::test]
    async fn test_handle_session_summary() {
        let (coordinator, clock, _) = coordinator();
        enabled(&coordinator, 10, 4).await;
        coordinator.initialize().await.unwrap();
        coordinator.record_submission().await.unwrap();
        clock.advance(Duration::from_secs(60));

        let response = coordinator.handle(Request::GetSessionSummary).await;
        let summary: SessionSummary = response.data_as().unwrap();
        assert_eq!(summary.prompts_remaining, 3);
        assert_eq!(summary.time_remaining, "9:00");
    }

    #[tokio::test]
    async fn test_usage_lives_in_local_area() {
        let (coordinator, _clock, storage) = coordinator();
        coordinator.initialize().await.unwrap();
        assert!(storage.local().get(USAGE_KEY).await.unwrap().is_some());
        assert!(storage.sync().get(USAGE_KEY).await.unwrap().is_none());
        assert!(storage.sync().get(SETTINGS_KEY).await.unwrap().is_some());
    }
}
