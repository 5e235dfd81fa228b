//! In-memory page used by the unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    ElementDescriptor, Notice, Page, PageElement, PageError, SyntheticEvent, TriggerState,
};

/// What happened to a fake element, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ElementAction {
    Focus,
    SetContent(String),
    Event(SyntheticEvent),
}

pub struct FakeElement {
    descriptor: ElementDescriptor,
    visible: bool,
    accepts_input: bool,
    actions: Mutex<Vec<ElementAction>>,
}

impl FakeElement {
    pub fn new(descriptor: ElementDescriptor) -> Arc<Self> {
        Arc::new(Self::plain(descriptor))
    }

    pub fn hidden(descriptor: ElementDescriptor) -> Arc<Self> {
        Arc::new(Self {
            visible: false,
            ..Self::plain(descriptor)
        })
    }

    pub fn read_only(descriptor: ElementDescriptor) -> Arc<Self> {
        Arc::new(Self {
            accepts_input: false,
            ..Self::plain(descriptor)
        })
    }

    fn plain(descriptor: ElementDescriptor) -> Self {
        Self {
            descriptor,
            visible: true,
            accepts_input: true,
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn actions(&self) -> Vec<ElementAction> {
        self.actions.lock().unwrap().clone()
    }

    fn push(&self, action: ElementAction) {
        self.actions.lock().unwrap().push(action);
    }
}

#[async_trait]
impl PageElement for FakeElement {
    fn descriptor(&self) -> &ElementDescriptor {
        &self.descriptor
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn accepts_input(&self) -> bool {
        self.accepts_input
    }

    async fn focus(&self) -> Result<(), PageError> {
        self.push(ElementAction::Focus);
        Ok(())
    }

    async fn set_content(&self, text: &str) -> Result<(), PageError> {
        self.push(ElementAction::SetContent(text.to_string()));
        Ok(())
    }

    async fn dispatch(&self, event: SyntheticEvent) -> Result<(), PageError> {
        self.push(ElementAction::Event(event));
        Ok(())
    }
}

pub fn as_page_elements(items: Vec<Arc<FakeElement>>) -> Vec<Arc<dyn PageElement>> {
    items
        .into_iter()
        .map(|e| e as Arc<dyn PageElement>)
        .collect()
}

#[derive(Default)]
pub struct FakePage {
    elements: Mutex<Vec<Arc<dyn PageElement>>>,
    notices: Mutex<Vec<Notice>>,
    triggers: Mutex<Vec<(TriggerState, String)>>,
}

impl FakePage {
    pub fn with_elements(items: Vec<Arc<FakeElement>>) -> Arc<Self> {
        let page = Self::default();
        *page.elements.lock().unwrap() = as_page_elements(items);
        Arc::new(page)
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn last_trigger(&self) -> Option<(TriggerState, String)> {
        self.triggers.lock().unwrap().last().cloned()
    }

    pub fn trigger_states(&self) -> Vec<TriggerState> {
        self.triggers.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }
}

#[async_trait]
impl Page for FakePage {
    fn url(&self) -> String {
        "https://chat.example.com/c/1".to_string()
    }

    async fn elements(&self) -> Vec<Arc<dyn PageElement>> {
        self.elements.lock().unwrap().clone()
    }

    async fn show_notice(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    async fn render_trigger(&self, state: TriggerState, label: &str) {
        self.triggers
            .lock()
            .unwrap()
            .push((state, label.to_string()));
    }
}
