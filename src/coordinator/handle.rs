//! Actor task and handles for the coordinator
//!
//! A single task owns the [`Coordinator`] and runs commands one at a time in
//! arrival order. Concurrent callers can therefore never interleave a
//! read-modify-write on the usage record.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::{Coordinator, CoordinatorError};
use crate::config::Settings;
use crate::protocol::{AgentNotice, Request, Response};
use crate::quota::UsageData;

const COMMAND_CAPACITY: usize = 64;

enum Command {
    Request {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    EvaluateTimeLimit {
        reply: oneshot::Sender<Result<bool, CoordinatorError>>,
    },
    PageLoaded {
        url: String,
        reply: oneshot::Sender<Result<bool, CoordinatorError>>,
    },
}

/// The request/response half of the protocol, as seen by agents and
/// settings surfaces
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    /// Sends one request and waits for its single response
    async fn request(&self, request: Request) -> Response;
}

/// Cheap, cloneable address of the running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    notices: broadcast::Sender<AgentNotice>,
}

pub(super) fn spawn(coordinator: Coordinator) -> CoordinatorHandle {
    let (commands, mut inbox) = mpsc::channel(COMMAND_CAPACITY);
    let notices = coordinator.notice_sender();

    tokio::spawn(async move {
        while let Some(command) = inbox.recv().await {
            // A dropped reply receiver means the caller gave up; nothing to do
            match command {
                Command::Request { request, reply } => {
                    let _ = reply.send(coordinator.handle(request).await);
                }
                Command::EvaluateTimeLimit { reply } => {
                    let _ = reply.send(coordinator.evaluate_time_limit().await);
                }
                Command::PageLoaded { url, reply } => {
                    let _ = reply.send(coordinator.handle_navigation(&url).await);
                }
            }
        }
        tracing::debug!("Coordinator actor stopped");
    });

    CoordinatorHandle { commands, notices }
}

impl CoordinatorHandle {
    async fn call(&self, request: Request) -> Response {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(Command::Request { request, reply })
            .await
            .is_err()
        {
            return Response::failure(CoordinatorError::Unavailable.to_string());
        }
        response
            .await
            .unwrap_or_else(|_| Response::failure(CoordinatorError::Unavailable.to_string()))
    }

    /// Decodes a raw message and answers it
    ///
    /// Unknown actions and bad payloads are answered with an error response
    /// and never reach the store.
    pub async fn dispatch(&self, message: Value) -> Response {
        match Request::parse(message) {
            Ok(request) => self.call(request).await,
            Err(e) => {
                tracing::debug!("Rejected message: {:?}", e);
                e.into()
            }
        }
    }

    /// Runs the time-limit evaluation inside the actor
    pub async fn evaluate_time_limit(&self) -> Result<bool, CoordinatorError> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::EvaluateTimeLimit { reply })
            .await
            .map_err(|_| CoordinatorError::Unavailable)?;
        result.await.map_err(|_| CoordinatorError::Unavailable)?
    }

    /// Reports a completed page load in some tab
    pub async fn page_loaded(&self, url: impl Into<String>) -> Result<bool, CoordinatorError> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::PageLoaded {
                url: url.into(),
                reply,
            })
            .await
            .map_err(|_| CoordinatorError::Unavailable)?;
        result.await.map_err(|_| CoordinatorError::Unavailable)?
    }

    /// Subscribes to notices for page agents
    pub fn subscribe(&self) -> broadcast::Receiver<AgentNotice> {
        self.notices.subscribe()
    }

    /// Pushes a notice to every agent, as a settings surface does after a save.
    /// At most once; returns false if nobody was listening.
    pub fn notify_agents(&self, notice: AgentNotice) -> bool {
        self.notices.send(notice).is_ok()
    }

    pub async fn get_settings(&self) -> Option<Settings> {
        self.call(Request::GetSettings).await.data_as()
    }

    pub async fn get_usage_data(&self) -> Option<UsageData> {
        self.call(Request::GetUsageData).await.data_as()
    }

    pub async fn check_permission(&self) -> bool {
        self.call(Request::CheckPermission)
            .await
            .can_use
            .unwrap_or(false)
    }
}

#[async_trait]
impl CoordinatorClient for CoordinatorHandle {
    async fn request(&self, request: Request) -> Response {
        self.call(request).await
    }
}
