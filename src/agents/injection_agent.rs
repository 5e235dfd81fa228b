//! Injection agent - Fills and submits the configured prompt on a page
//!
//! One agent lives in each page. While auto-running it performs a cycle
//! immediately and then on every tick of a fixed interval. A cycle locates the
//! chat input, fills it, waits for the page to settle, submits, reports the
//! submission to the coordinator and cools down.
//!
//! The agent does not check the quota before each cycle unless
//! [`InjectionConfig::check_permission_each_cycle`] is set. It stops when the
//! coordinator reports `timeLimitExceeded` or when refreshed settings show
//! automation disabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::base::{Agent, AgentError, AgentStatus};
use crate::config::{AppConfig, Settings, DEFAULT_PROMPT};
use crate::coordinator::CoordinatorClient;
use crate::page::{InputLocator, Notice, Page, PageError, TriggerState, FILL_SEQUENCE, SUBMIT_SEQUENCE};
use crate::protocol::{AgentNotice, Request, Response};
use crate::security::Sanitizer;

const LOG_PROMPT_CHARS: usize = 40;

/// Why a cycle did not submit
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InjectionError {
    #[error("Chat input not found")]
    NoInputFound,

    #[error("Chat input is not accepting input")]
    NotReady,

    #[error(transparent)]
    Page(#[from] PageError),
}

impl InjectionError {
    /// Text of the transient notice shown on the page, if any
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            InjectionError::NoInputFound => Some("Chat input not found"),
            InjectionError::NotReady => Some("Wait for chat to be ready"),
            InjectionError::Page(_) => None,
        }
    }
}

/// Result of a cycle that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionOutcome {
    /// The prompt was submitted through the input found by `probe`
    Submitted { probe: &'static str },
    /// An earlier cycle was still processing
    Busy,
}

/// Timing of the injection loop
#[derive(Debug, Clone)]
pub struct InjectionConfig {
    /// Interval between cycles while auto-running
    pub interval: Duration,
    /// Delay between filling and submitting
    pub settle: Duration,
    /// Delay after submitting before the next cycle may start
    pub cooldown: Duration,
    /// Ask the coordinator for permission before every cycle
    pub check_permission_each_cycle: bool,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            settle: Duration::from_millis(300),
            cooldown: Duration::from_millis(2000),
            check_permission_each_cycle: false,
        }
    }
}

impl InjectionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.injection_interval_secs.max(1)),
            ..Self::default()
        }
    }

    /// Creates a config with all delays in milliseconds (for testing)
    pub fn with_millis(interval: u64, settle: u64, cooldown: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval),
            settle: Duration::from_millis(settle),
            cooldown: Duration::from_millis(cooldown),
            check_permission_each_cycle: false,
        }
    }
}

/// What the agent last read from the coordinator
#[derive(Debug, Clone)]
struct PageSettings {
    enabled: bool,
    prompt: String,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Page-resident agent driving the chat input
pub struct InjectionAgent {
    config: InjectionConfig,
    client: Arc<dyn CoordinatorClient>,
    page: Arc<dyn Page>,
    locator: InputLocator,
    settings: RwLock<PageSettings>,
    processing: AtomicBool,
    status: RwLock<AgentStatus>,
    cancel_token: Mutex<CancellationToken>,
}

impl InjectionAgent {
    pub fn new(client: Arc<dyn CoordinatorClient>, page: Arc<dyn Page>) -> Self {
        Self::with_config(client, page, InjectionConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn CoordinatorClient>,
        page: Arc<dyn Page>,
        config: InjectionConfig,
    ) -> Self {
        Self {
            config,
            client,
            page,
            locator: InputLocator::default(),
            settings: RwLock::new(PageSettings::default()),
            processing: AtomicBool::new(false),
            status: RwLock::new(AgentStatus::Idle),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Replaces the input probes
    pub fn with_locator(mut self, locator: InputLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Reads settings and renders the trigger, as done once the page is ready
    pub async fn setup(&self) {
        self.refresh_settings().await;
        self.update_trigger().await;
    }

    /// Re-reads settings from the coordinator
    ///
    /// Keeps the previous values when the coordinator has none or fails.
    pub async fn refresh_settings(&self) -> Option<Settings> {
        let response = self.client.request(Request::GetSettings).await;
        let settings: Option<Settings> = if response.success {
            response.data_as()
        } else {
            None
        };

        match &settings {
            Some(s) => {
                let mut state = self.settings.write().await;
                state.enabled = s.is_enabled;
                state.prompt = s.effective_prompt().to_string();
            }
            None => tracing::debug!("No settings available: {:?}", response.error),
        }
        settings
    }

    pub async fn is_enabled(&self) -> bool {
        self.settings.read().await.enabled
    }

    pub async fn prompt(&self) -> String {
        self.settings.read().await.prompt.clone()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Trigger state, by priority: disabled, running, processing, idle
    pub async fn trigger_state(&self) -> TriggerState {
        if !self.is_enabled().await {
            TriggerState::Disabled
        } else if self.status.read().await.is_running() {
            TriggerState::Running
        } else if self.is_processing() {
            TriggerState::Processing
        } else {
            TriggerState::Idle
        }
    }

    pub async fn update_trigger(&self) {
        let state = self.trigger_state().await;
        let label = state.label(&self.prompt().await);
        self.page.render_trigger(state, &label).await;
    }

    /// Toggles auto-sending, as a click on the trigger does
    ///
    /// Ignored while disabled or while a cycle is processing.
    pub async fn activate(self: &Arc<Self>) -> Result<(), AgentError> {
        if !self.is_enabled().await {
            return Err(AgentError::Disabled);
        }
        if self.is_processing() {
            return Err(AgentError::Busy);
        }

        if self.status.read().await.is_running() {
            return self.stop().await;
        }

        let token = self.begin().await?;
        let agent = Arc::clone(self);
        tokio::spawn(async move { agent.run(token).await });
        Ok(())
    }

    /// Reacts to a notice from the coordinator or a settings surface
    pub async fn handle_notice(&self, notice: AgentNotice) -> Response {
        match notice {
            AgentNotice::SettingsUpdated => {
                self.refresh_settings().await;
                if !self.is_enabled().await {
                    // Never fails
                    let _ = self.stop().await;
                }
                self.update_trigger().await;
            }
            AgentNotice::TimeLimitExceeded => {
                tracing::info!("Time limit exceeded, stopping auto-send");
                self.settings.write().await.enabled = false;
                let _ = self.stop().await;
                self.update_trigger().await;
            }
        }
        Response::ok()
    }

    /// Answers a raw message addressed to this agent
    pub async fn handle_message(&self, message: &Value) -> Response {
        match AgentNotice::parse(message) {
            Some(notice) => self.handle_notice(notice).await,
            None => Response::declined(),
        }
    }

    /// Feeds broadcast notices into [`Self::handle_notice`] until the channel closes
    pub fn spawn_notice_listener(
        self: &Arc<Self>,
        mut notices: broadcast::Receiver<AgentNotice>,
    ) -> JoinHandle<()> {
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match notices.recv().await {
                    Ok(notice) => {
                        agent.handle_notice(notice).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Missed {} notices", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Runs one cycle now
    ///
    /// Returns [`InjectionOutcome::Busy`] without touching the page if a
    /// cycle is already in flight.
    pub async fn inject_once(&self) -> Result<InjectionOutcome, InjectionError> {
        if self.processing.swap(true, Ordering::SeqCst) {
            return Ok(InjectionOutcome::Busy);
        }
        self.update_trigger().await;

        let result = self.fill_and_submit().await;
        match &result {
            Ok(_) => tokio::time::sleep(self.config.cooldown).await,
            Err(e) => {
                if let Some(message) = e.notice() {
                    self.page.show_notice(Notice::transient(message)).await;
                }
            }
        }

        self.processing.store(false, Ordering::SeqCst);
        self.update_trigger().await;
        result
    }

    async fn fill_and_submit(&self) -> Result<InjectionOutcome, InjectionError> {
        let prompt = self.prompt().await;
        let elements = self.page.elements().await;

        let (input, probe) = self
            .locator
            .locate(&elements)
            .ok_or(InjectionError::NoInputFound)?;
        if !input.accepts_input() {
            return Err(InjectionError::NotReady);
        }

        input.focus().await?;
        input.set_content(&prompt).await?;
        for event in FILL_SEQUENCE {
            input.dispatch(*event).await?;
        }
        tracing::debug!(
            "Filled '{}' via {}",
            Sanitizer::truncate_for_log(&prompt, LOG_PROMPT_CHARS),
            probe
        );

        tokio::time::sleep(self.config.settle).await;
        for event in SUBMIT_SEQUENCE {
            input.dispatch(*event).await?;
        }

        self.report_submission();
        Ok(InjectionOutcome::Submitted { probe })
    }

    /// Fire-and-forget; a failed report is logged and never retried
    fn report_submission(&self) {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            let response = client.request(Request::RecordUsage).await;
            if !response.success {
                tracing::warn!(
                    "Could not record usage: {}",
                    response.error.as_deref().unwrap_or("unknown error")
                );
            }
        });
    }

    async fn permitted(&self) -> bool {
        self.client
            .request(Request::CheckPermission)
            .await
            .can_use
            .unwrap_or(false)
    }

    async fn begin(&self) -> Result<CancellationToken, AgentError> {
        {
            let mut status = self.status.write().await;
            if status.is_running() {
                return Err(AgentError::AlreadyRunning);
            }
            *status = AgentStatus::Running;
        }

        let token = CancellationToken::new();
        *self.cancel_token.lock().await = token.clone();
        tracing::info!("Auto-sending started on {}", Sanitizer::sanitize_url(&self.page.url()));
        self.update_trigger().await;
        Ok(token)
    }

    async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // A tick skipped during a long cycle is ready at once; stopping wins
                biased;
                _ = token.cancelled() => break,
                // The first tick completes immediately
                _ = ticker.tick() => {
                    if token.is_cancelled() {
                        break;
                    }
                    self.run_cycle().await;
                }
            }
        }
        tracing::info!("Auto-sending stopped");
    }

    async fn run_cycle(&self) {
        if self.config.check_permission_each_cycle && !self.permitted().await {
            tracing::info!("Permission denied, stopping auto-send");
            let _ = self.stop().await;
            return;
        }

        match self.inject_once().await {
            Ok(InjectionOutcome::Submitted { probe }) => {
                tracing::debug!("Prompt submitted via {}", probe)
            }
            Ok(InjectionOutcome::Busy) => tracing::debug!("Skipping tick, still processing"),
            Err(e) => tracing::warn!("Injection cycle failed: {}", e),
        }
    }
}

#[async_trait]
impl Agent for InjectionAgent {
    fn id(&self) -> &'static str {
        "injection"
    }

    fn name(&self) -> &'static str {
        "Injection Agent"
    }

    fn status(&self) -> AgentStatus {
        self.status
            .try_read()
            .map(|s| s.clone())
            .unwrap_or(AgentStatus::Idle)
    }

    async fn start(&self) -> Result<(), AgentError> {
        let token = self.begin().await?;
        self.run(token).await;
        Ok(())
    }

    /// Cancels the interval; an in-flight cycle still completes
    async fn stop(&self) -> Result<(), AgentError> {
        {
            let mut status = self.status.write().await;
            if !status.is_running() {
                return Ok(());
            }
            *status = AgentStatus::Stopped;
        }
        self.cancel_token.lock().await.cancel();
        self.update_trigger().await;
        Ok(())
    }

    async fn trigger(&self) -> Result<(), AgentError> {
        match self.inject_once().await {
            Ok(InjectionOutcome::Submitted { .. }) => Ok(()),
            Ok(InjectionOutcome::Busy) => Err(AgentError::Busy),
            Err(e) => Err(AgentError::OperationFailed(e.to_string())),
        }
    }
}
