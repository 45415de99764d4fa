//! Owned event model.
//!
//! Handlers receive borrowed data. Stages that have to keep an event beyond
//! the current call (buffers, recorders, cross-thread channels) store it as
//! an owned [`Event`] and replay it later with [`Event::send_to`].

use crate::Result;
use crate::attributes::Attributes;
use crate::handler::ContentHandler;

/// One markup event with owned data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartDocument,
    EndDocument,
    StartPrefixMapping { prefix: String, uri: String },
    EndPrefixMapping { prefix: String },
    StartElement { uri: String, local_name: String, qname: String, attributes: Attributes },
    EndElement { uri: String, local_name: String, qname: String },
    Characters(String),
    Comment(String),
    StartCdata,
    EndCdata,
    ProcessingInstruction { target: String, data: String },
    StartEntity(String),
    EndEntity(String),
}

impl Event {
    /// `StartElement` from borrowed name parts.
    pub fn start_element(uri: &str, local_name: &str, qname: &str, attributes: Attributes) -> Self {
        Self::StartElement {
            uri: uri.to_string(),
            local_name: local_name.to_string(),
            qname: qname.to_string(),
            attributes,
        }
    }

    /// `EndElement` from borrowed name parts.
    pub fn end_element(uri: &str, local_name: &str, qname: &str) -> Self {
        Self::EndElement {
            uri: uri.to_string(),
            local_name: local_name.to_string(),
            qname: qname.to_string(),
        }
    }

    /// Replays the event on `handler`.
    pub fn send_to(&self, handler: &mut dyn ContentHandler) -> Result<()> {
        match self {
            Self::StartDocument => handler.start_document(),
            Self::EndDocument => handler.end_document(),
            Self::StartPrefixMapping { prefix, uri } => handler.start_prefix_mapping(prefix, uri),
            Self::EndPrefixMapping { prefix } => handler.end_prefix_mapping(prefix),
            Self::StartElement { uri, local_name, qname, attributes } => {
                handler.start_element(uri, local_name, qname, attributes)
            }
            Self::EndElement { uri, local_name, qname } => {
                handler.end_element(uri, local_name, qname)
            }
            Self::Characters(text) => handler.characters(text),
            Self::Comment(text) => handler.comment(text),
            Self::StartCdata => handler.start_cdata(),
            Self::EndCdata => handler.end_cdata(),
            Self::ProcessingInstruction { target, data } => {
                handler.processing_instruction(target, data)
            }
            Self::StartEntity(name) => handler.start_entity(name),
            Self::EndEntity(name) => handler.end_entity(name),
        }
    }

    /// True for whitespace-only `Characters`.
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Self::Characters(text) if is_whitespace(text))
    }
}

/// Replays all `events` in order, stopping at the first error.
pub fn send_all(events: &[Event], handler: &mut dyn ContentHandler) -> Result<()> {
    events.iter().try_for_each(|event| event.send_to(handler))
}

/// XML whitespace test (space, tab, CR, LF).
pub(crate) fn is_whitespace(text: &str) -> bool {
    text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}
