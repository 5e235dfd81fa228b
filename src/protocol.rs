//! Message protocol between the coordinator, page agents and settings surfaces
//!
//! Every message is a JSON object tagged by `action`. Requests travel to the
//! coordinator and get exactly one [`Response`]; [`AgentNotice`]s travel the
//! other way and are delivered at most once.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Settings;

/// Error text returned for unrecognised actions
pub const UNKNOWN_ACTION: &str = "Unknown action";

/// Actions the coordinator answers
pub const REQUEST_ACTIONS: &[&str] = &[
    "getSettings",
    "saveSettings",
    "checkPermission",
    "recordUsage",
    "getUsageData",
    "resetUsage",
    "getSessionSummary",
];

/// Errors raised while decoding an incoming message
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The `action` tag is missing or not one we handle
    #[error("Unknown action")]
    UnknownAction(Option<String>),

    /// The action is known but its payload does not decode
    #[error("Malformed '{action}' request: {reason}")]
    Malformed { action: String, reason: String },
}

/// A request addressed to the coordinator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetSettings,
    SaveSettings { settings: Settings },
    CheckPermission,
    RecordUsage,
    GetUsageData,
    ResetUsage,
    GetSessionSummary,
}

impl Request {
    /// Decodes a raw message, separating unknown actions from bad payloads
    pub fn parse(message: Value) -> Result<Self, ProtocolError> {
        let action = match message.get("action").and_then(Value::as_str) {
            Some(action) => action.to_string(),
            None => return Err(ProtocolError::UnknownAction(None)),
        };

        if !REQUEST_ACTIONS.contains(&action.as_str()) {
            return Err(ProtocolError::UnknownAction(Some(action)));
        }

        serde_json::from_value(message).map_err(|e| ProtocolError::Malformed {
            action,
            reason: e.to_string(),
        })
    }

    /// The wire name of this request
    pub fn action(&self) -> &'static str {
        match self {
            Request::GetSettings => "getSettings",
            Request::SaveSettings { .. } => "saveSettings",
            Request::CheckPermission => "checkPermission",
            Request::RecordUsage => "recordUsage",
            Request::GetUsageData => "getUsageData",
            Request::ResetUsage => "resetUsage",
            Request::GetSessionSummary => "getSessionSummary",
        }
    }
}

/// Reply to a [`Request`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_use: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// `{success: true}`
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// `{success: true, data}`; `None` is sent as an explicit `null`
    pub fn with_data<T: Serialize>(data: Option<&T>) -> Self {
        let data = match data.map(serde_json::to_value) {
            Some(Ok(value)) => value,
            Some(Err(e)) => return Self::failure(e.to_string()),
            None => Value::Null,
        };
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    /// `{success: true, canUse}`
    pub fn permission(can_use: bool) -> Self {
        Self {
            success: true,
            can_use: Some(can_use),
            ..Self::default()
        }
    }

    /// `{success: false, error}`
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// `{success: false}` with no reason, as page agents answer unknown notices
    pub fn declined() -> Self {
        Self::default()
    }

    /// Decodes the `data` payload, `None` if absent or null
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        match &self.data {
            None | Some(Value::Null) => None,
            Some(value) => serde_json::from_value(value.clone()).ok(),
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Response::failure(err.to_string())
    }
}

/// Messages pushed from the coordinator (or a settings surface) to page agents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AgentNotice {
    /// Settings changed; agents should re-read them
    SettingsUpdated,
    /// The session ran out of time and automation was disabled
    TimeLimitExceeded,
}

impl AgentNotice {
    /// Decodes a raw message addressed to an agent, `None` if not a notice
    pub fn parse(message: &Value) -> Option<Self> {
        serde_json::from_value(message.clone()).ok()
    }
}
