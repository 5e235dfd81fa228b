//! Page module - Capability interface between an agent and its page
//!
//! The agent never touches a DOM. It sees a [`Page`] that lists candidate
//! [`PageElement`]s, shows notices and renders the trigger, and it drives an
//! element by dispatching [`SyntheticEvent`] sequences. Hosts (a browser
//! bridge, a WebDriver session, a test fake) implement these traits.

mod locator;

#[cfg(test)]
pub(crate) mod fake;

pub use locator::{InputLocator, InputProbe, DEFAULT_PROBES};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long a transient notice stays on the page
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

/// Errors reported by a page host
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PageError {
    /// The element was removed from the page
    #[error("Element detached from page")]
    Detached,

    /// Host-side failure
    #[error("Page error: {0}")]
    Host(String),
}

/// Element kinds the input probes distinguish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementTag {
    Textarea,
    Input,
    Div,
    Other(String),
}

/// Static description of an element, matched by the input probes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub tag: ElementTag,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub content_editable: bool,
}

impl ElementDescriptor {
    pub fn new(tag: ElementTag) -> Self {
        Self {
            tag,
            attributes: BTreeMap::new(),
            content_editable: false,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn editable(mut self) -> Self {
        self.content_editable = true;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Form controls carry `disabled`/`readonly`; contenteditable nodes don't
    pub fn is_form_control(&self) -> bool {
        matches!(self.tag, ElementTag::Textarea | ElementTag::Input)
    }
}

/// Keys the agent presses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Enter,
}

/// One DOM-level event the host dispatches on an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "lowercase")]
pub enum SyntheticEvent {
    Input,
    Change,
    KeyDown(Key),
    KeyUp(Key),
}

/// Events after the content is set, so reactive frameworks see the change
pub const FILL_SEQUENCE: &[SyntheticEvent] = &[
    SyntheticEvent::Input,
    SyntheticEvent::Change,
    SyntheticEvent::KeyDown(Key::Enter),
    SyntheticEvent::KeyUp(Key::Enter),
];

/// Events that submit the filled input
pub const SUBMIT_SEQUENCE: &[SyntheticEvent] = &[
    SyntheticEvent::KeyDown(Key::Enter),
    SyntheticEvent::KeyUp(Key::Enter),
    SyntheticEvent::Input,
];

/// A candidate input element on the page
#[async_trait]
pub trait PageElement: Send + Sync {
    fn descriptor(&self) -> &ElementDescriptor;

    /// Has a non-empty box and is not hidden by style
    fn is_visible(&self) -> bool;

    /// Not disabled and not read-only. Contenteditable elements always accept.
    fn accepts_input(&self) -> bool;

    async fn focus(&self) -> Result<(), PageError>;

    /// Replaces the element's value or text content
    async fn set_content(&self, text: &str) -> Result<(), PageError>;

    async fn dispatch(&self, event: SyntheticEvent) -> Result<(), PageError>;
}

/// Visual state of the agent's trigger control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerState {
    Disabled,
    Idle,
    Running,
    Processing,
}

impl TriggerState {
    pub fn label(&self, prompt: &str) -> String {
        match self {
            TriggerState::Disabled => "Extension Disabled".to_string(),
            TriggerState::Running => "Stop Auto-Sending".to_string(),
            TriggerState::Processing => "Processing...".to_string(),
            TriggerState::Idle => format!("Start Auto-Sending \"{}\"", prompt),
        }
    }
}

/// A short message shown on the page and dismissed by the host after `ttl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub ttl: Duration,
}

impl Notice {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ttl: NOTICE_TTL,
        }
    }
}

/// The page an agent lives in
#[async_trait]
pub trait Page: Send + Sync {
    /// Current URL of the page
    fn url(&self) -> String;

    /// Candidate elements in document order
    async fn elements(&self) -> Vec<Arc<dyn PageElement>>;

    async fn show_notice(&self, notice: Notice);

    async fn render_trigger(&self, state: TriggerState, label: &str);
}
