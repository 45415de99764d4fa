//! Bundled event producer: XML text → [`ContentHandler`] calls (quick-xml).
//!
//! The producer reports namespaces the SAX way: `xmlns` attributes become
//! `start_prefix_mapping` events right before the element and
//! `end_prefix_mapping` events right after its end, and never show up in the
//! attribute view. Adjacent text (including resolved character and predefined
//! entity references) is coalesced into one `characters` call. References to
//! other entities are reported as an empty `start_entity`/`end_entity` pair.

use std::io::BufRead;

use quick_xml::reader::NsReader;

use crate::Result;
use crate::event::Event;
use crate::handler::{ContentHandler, EventRecorder};

mod emit;

/// Parser-Flags.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParseFlags {
    /// Kein StartDocument/EndDocument, Text und mehrere Elemente auf Ebene 0 erlaubt.
    pub fragment: bool,
    /// System-Identifier fuer Fehlermeldungen.
    pub system_id: Option<String>,
}

/// Parses a complete document from a string.
pub fn parse_str(xml: &str, handler: &mut dyn ContentHandler) -> Result<()> {
    let reader = NsReader::from_reader(xml.as_bytes());
    emit::emit_events(reader, &ParseFlags::default(), Some(xml), handler)
}

/// Parses a complete document from a buffered reader.
///
/// `system_id` (usually the file name) is attached to parse error locations.
pub fn parse_reader(
    reader: impl BufRead,
    system_id: Option<&str>,
    handler: &mut dyn ContentHandler,
) -> Result<()> {
    let flags = ParseFlags { fragment: false, system_id: system_id.map(str::to_string) };
    emit::emit_events(NsReader::from_reader(reader), &flags, None, handler)
}

/// Parses a markup fragment: any mix of text and elements, no document events.
pub fn parse_fragment(markup: &str, handler: &mut dyn ContentHandler) -> Result<()> {
    let flags = ParseFlags { fragment: true, system_id: None };
    emit::emit_events(NsReader::from_reader(markup.as_bytes()), &flags, Some(markup), handler)
}

/// Parses a document into owned events.
pub fn parse_str_to_events(xml: &str) -> Result<Vec<Event>> {
    let mut recorder = EventRecorder::new();
    parse_str(xml, &mut recorder)?;
    Ok(recorder.into_events())
}
