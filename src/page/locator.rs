//! Input location heuristics
//!
//! An ordered list of probes, most specific first. For each probe only the
//! first matching element in document order is considered; if it is not
//! visible the next probe is tried.

use std::sync::Arc;

use super::{ElementDescriptor, ElementTag, PageElement};

/// A named predicate over element descriptors
#[derive(Clone, Copy)]
pub struct InputProbe {
    pub name: &'static str,
    matches: fn(&ElementDescriptor) -> bool,
}

impl InputProbe {
    pub const fn new(name: &'static str, matches: fn(&ElementDescriptor) -> bool) -> Self {
        Self { name, matches }
    }

    pub fn matches(&self, descriptor: &ElementDescriptor) -> bool {
        (self.matches)(descriptor)
    }
}

impl std::fmt::Debug for InputProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InputProbe").field(&self.name).finish()
    }
}

fn textarea_with_data_id(d: &ElementDescriptor) -> bool {
    d.tag == ElementTag::Textarea && d.has_attribute("data-id")
}

fn prompt_textarea_id(d: &ElementDescriptor) -> bool {
    d.attribute("id") == Some("prompt-textarea")
}

fn testid_textbox(d: &ElementDescriptor) -> bool {
    d.attribute("data-testid") == Some("textbox")
}

fn message_placeholder(d: &ElementDescriptor) -> bool {
    d.tag == ElementTag::Textarea
        && d.attribute("placeholder")
            .is_some_and(|p| p.contains("Message"))
}

fn editable_textbox(d: &ElementDescriptor) -> bool {
    d.content_editable && d.attribute("role") == Some("textbox")
}

fn any_textarea(d: &ElementDescriptor) -> bool {
    d.tag == ElementTag::Textarea
}

fn any_editable(d: &ElementDescriptor) -> bool {
    d.content_editable
}

pub const DEFAULT_PROBES: &[InputProbe] = &[
    InputProbe::new("textarea[data-id]", textarea_with_data_id),
    InputProbe::new("#prompt-textarea", prompt_textarea_id),
    InputProbe::new("[data-testid=\"textbox\"]", testid_textbox),
    InputProbe::new("textarea[placeholder*=\"Message\"]", message_placeholder),
    InputProbe::new("[contenteditable][role=\"textbox\"]", editable_textbox),
    InputProbe::new("textarea", any_textarea),
    InputProbe::new("[contenteditable]", any_editable),
];

/// Finds the chat input among a page's elements
#[derive(Debug, Clone)]
pub struct InputLocator {
    probes: Vec<InputProbe>,
}

impl Default for InputLocator {
    fn default() -> Self {
        Self::new(DEFAULT_PROBES.to_vec())
    }
}

impl InputLocator {
    pub fn new(probes: Vec<InputProbe>) -> Self {
        Self { probes }
    }

    pub fn probes(&self) -> &[InputProbe] {
        &self.probes
    }

    /// First visible hit, with the name of the probe that found it
    pub fn locate(
        &self,
        elements: &[Arc<dyn PageElement>],
    ) -> Option<(Arc<dyn PageElement>, &'static str)> {
        self.probes.iter().find_map(|probe| {
            elements
                .iter()
                .find(|e| probe.matches(e.descriptor()))
                .filter(|e| e.is_visible())
                .map(|e| (Arc::clone(e), probe.name))
        })
    }
}
