//! Empty-element elision.
//!
//! Two strategies, selected through [`EmptyElementPolicy`]:
//!
//! - [`DeferringEmptyElementFilter`] holds back one `start_element`. If the
//!   very next event is its `end_element`, both are dropped; any other event
//!   flushes the held start first.
//! - [`BufferingEmptyElementFilter`] keeps the whole chain of open elements
//!   that have not shown content yet, with the namespace mappings declared
//!   right before each and the comments, processing instructions and
//!   whitespace seen inside it. Non-whitespace text or CDATA flushes the chain
//!   outermost first; an element that closes while still pending is dropped
//!   with everything buffered for it, nested empty elements included.
//!
//! In both strategies the `end_prefix_mapping` events that belong to a dropped
//! element are swallowed, so forwarded mappings stay balanced.

use log::trace;

use crate::Result;
use crate::attributes::Attributes;
use crate::event::{Event, is_whitespace};
use crate::handler::ContentHandler;

/// How empty elements are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyElementPolicy {
    /// Only an element immediately followed by its end is empty.
    SingleLevel {
        /// An element with attributes is never considered empty.
        attributes_are_content: bool,
    },
    /// An element is empty if its subtree holds no text and no CDATA.
    /// Attributes always count as content.
    Buffered,
}

impl Default for EmptyElementPolicy {
    fn default() -> Self {
        Self::SingleLevel { attributes_are_content: false }
    }
}

/// Deferred `start_element` with its name, attributes and namespace mappings.
#[derive(Debug, Clone)]
struct HeldStart {
    uri: String,
    local_name: String,
    qname: String,
    attributes: Attributes,
    mappings: Vec<(String, String)>,
}

impl HeldStart {
    fn new(uri: &str, local_name: &str, qname: &str, attributes: &Attributes, mappings: Vec<(String, String)>) -> Self {
        Self {
            uri: uri.to_string(),
            local_name: local_name.to_string(),
            qname: qname.to_string(),
            attributes: attributes.clone(),
            mappings,
        }
    }

    fn emit(&self, handler: &mut impl ContentHandler) -> Result<()> {
        for (prefix, uri) in &self.mappings {
            handler.start_prefix_mapping(prefix, uri)?;
        }
        handler.start_element(&self.uri, &self.local_name, &self.qname, &self.attributes)
    }
}

/// Single-level deferral.
pub struct DeferringEmptyElementFilter<H> {
    inner: H,
    attributes_are_content: bool,
    held: Option<HeldStart>,
    pending_mappings: Vec<(String, String)>,
    /// Anzahl zu verschluckender `end_prefix_mapping` Events.
    suppress: usize,
}

inner_access!(DeferringEmptyElementFilter<H>);

impl<H: ContentHandler> DeferringEmptyElementFilter<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            attributes_are_content: false,
            held: None,
            pending_mappings: Vec::new(),
            suppress: 0,
        }
    }

    pub fn with_attributes_are_content(mut self, attributes_are_content: bool) -> Self {
        self.attributes_are_content = attributes_are_content;
        self
    }

    fn flush(&mut self) -> Result<()> {
        match self.held.take() {
            Some(held) => held.emit(&mut self.inner),
            None => Ok(()),
        }
    }
}

impl<H: ContentHandler> ContentHandler for DeferringEmptyElementFilter<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn end_document(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.end_document()
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.flush()?;
        self.pending_mappings.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        if self.suppress > 0 {
            self.suppress -= 1;
            return Ok(());
        }
        self.flush()?;
        self.inner.end_prefix_mapping(prefix)
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.flush()?;
        let held = HeldStart::new(uri, local_name, qname, attributes, std::mem::take(&mut self.pending_mappings));
        if self.attributes_are_content && !attributes.is_empty() {
            return held.emit(&mut self.inner);
        }
        self.held = Some(held);
        Ok(())
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        if let Some(held) = self.held.take() {
            trace!("empty element '{qname}' dropped");
            self.suppress += held.mappings.len();
            return Ok(());
        }
        self.inner.end_element(uri, local_name, qname)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.flush()?;
        self.inner.characters(text)
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.flush()?;
        self.inner.comment(text)
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.start_cdata()
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.flush()?;
        self.inner.processing_instruction(target, data)
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        self.flush()?;
        self.inner.start_entity(name)
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        self.flush()?;
        self.inner.end_entity(name)
    }
}

/// Pending element: held start plus everything buffered while it had no content.
#[derive(Debug)]
struct PendingFrame {
    start: HeldStart,
    buffered: Vec<Event>,
}

/// Multi-level deferral with buffering.
pub struct BufferingEmptyElementFilter<H> {
    inner: H,
    frames: Vec<PendingFrame>,
    pending_mappings: Vec<(String, String)>,
    suppress: usize,
}

inner_access!(BufferingEmptyElementFilter<H>);

impl<H: ContentHandler> BufferingEmptyElementFilter<H> {
    pub fn new(inner: H) -> Self {
        Self { inner, frames: Vec::new(), pending_mappings: Vec::new(), suppress: 0 }
    }

    /// Number of elements currently held back.
    pub fn pending_depth(&self) -> usize {
        self.frames.len()
    }

    /// Emits the pending chain outermost first.
    fn flush(&mut self) -> Result<()> {
        if self.frames.is_empty() {
            return Ok(());
        }
        trace!("flushing {} pending element(s)", self.frames.len());
        for frame in std::mem::take(&mut self.frames) {
            frame.start.emit(&mut self.inner)?;
            for event in &frame.buffered {
                event.send_to(&mut self.inner)?;
            }
        }
        Ok(())
    }

    /// Buffers `event` in the innermost pending element, or forwards it.
    fn buffer_or_forward(&mut self, event: Event) -> Result<()> {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.buffered.push(event);
                Ok(())
            }
            None => event.send_to(&mut self.inner),
        }
    }
}

impl<H: ContentHandler> ContentHandler for BufferingEmptyElementFilter<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.pending_mappings.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        if self.suppress > 0 {
            self.suppress -= 1;
            return Ok(());
        }
        self.inner.end_prefix_mapping(prefix)
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        let start = HeldStart::new(uri, local_name, qname, attributes, std::mem::take(&mut self.pending_mappings));
        self.frames.push(PendingFrame { start, buffered: Vec::new() });
        if !attributes.is_empty() {
            self.flush()?;
        }
        Ok(())
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        if let Some(frame) = self.frames.pop() {
            trace!("empty element '{qname}' dropped");
            self.suppress += frame.start.mappings.len();
            return Ok(());
        }
        self.inner.end_element(uri, local_name, qname)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if self.frames.is_empty() {
            return self.inner.characters(text);
        }
        if is_whitespace(text) {
            return self.buffer_or_forward(Event::Characters(text.to_string()));
        }
        self.flush()?;
        self.inner.characters(text)
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.start_cdata()
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.buffer_or_forward(Event::Comment(text.to_string()))
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.buffer_or_forward(Event::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        self.buffer_or_forward(Event::StartEntity(name.to_string()))
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        self.buffer_or_forward(Event::EndEntity(name.to_string()))
    }
}

/// Empty-element filter chosen by policy.
pub enum EmptyElementFilter<H> {
    SingleLevel(DeferringEmptyElementFilter<H>),
    Buffered(BufferingEmptyElementFilter<H>),
}

impl<H: ContentHandler> EmptyElementFilter<H> {
    pub fn new(policy: EmptyElementPolicy, inner: H) -> Self {
        match policy {
            EmptyElementPolicy::SingleLevel { attributes_are_content } => Self::SingleLevel(
                DeferringEmptyElementFilter::new(inner).with_attributes_are_content(attributes_are_content),
            ),
            EmptyElementPolicy::Buffered => Self::Buffered(BufferingEmptyElementFilter::new(inner)),
        }
    }

    pub fn get_ref(&self) -> &H {
        match self {
            Self::SingleLevel(f) => f.get_ref(),
            Self::Buffered(f) => f.get_ref(),
        }
    }

    pub fn get_mut(&mut self) -> &mut H {
        match self {
            Self::SingleLevel(f) => f.get_mut(),
            Self::Buffered(f) => f.get_mut(),
        }
    }

    pub fn into_inner(self) -> H {
        match self {
            Self::SingleLevel(f) => f.into_inner(),
            Self::Buffered(f) => f.into_inner(),
        }
    }
}

impl<H: ContentHandler> ContentHandler for EmptyElementFilter<H> {
    // Der gewaehlte Filter ist der Nachfolger; alle Events laufen durch ihn.
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        match self {
            Self::SingleLevel(f) => Some(f),
            Self::Buffered(f) => Some(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EventRecorder;
    use crate::xml::parse_str;
    use crate::xml_writer::XmlWriter;

    fn elide(policy: EmptyElementPolicy, xml: &str) -> String {
        let mut filter = EmptyElementFilter::new(policy, XmlWriter::new(Vec::new()));
        parse_str(xml, &mut filter).unwrap();
        filter.into_inner().into_string().unwrap()
    }

    const SINGLE: EmptyElementPolicy = EmptyElementPolicy::SingleLevel { attributes_are_content: false };

    #[test]
    fn single_level_drops_immediate_end() {
        assert_eq!(elide(SINGLE, "<r><a/><b>x</b><c></c></r>"), "<r><b>x</b></r>");
    }

    #[test]
    fn single_level_keeps_parent_of_dropped_child() {
        // Nur eine Ebene: <b> hatte ein Kind-Event und bleibt.
        assert_eq!(elide(SINGLE, "<r><b><a/></b></r>"), "<r><b/></r>");
    }

    #[test]
    fn single_level_whitespace_is_content() {
        assert_eq!(elide(SINGLE, "<r><a> </a></r>"), "<r><a> </a></r>");
    }

    #[test]
    fn single_level_attributes() {
        assert_eq!(elide(SINGLE, r#"<r><a k="v"/></r>"#), "<r/>");
        let attrs = EmptyElementPolicy::SingleLevel { attributes_are_content: true };
        assert_eq!(elide(attrs, r#"<r><a k="v"/></r>"#), r#"<r><a k="v"/></r>"#);
    }

    #[test]
    fn single_level_mappings_suppressed() {
        let mut filter = DeferringEmptyElementFilter::new(EventRecorder::new());
        parse_str(r#"<r><p:a xmlns:p="urn:p"/></r>"#, &mut filter).unwrap();
        let events = filter.into_inner().into_events();
        assert!(!events.iter().any(|e| matches!(e, Event::EndPrefixMapping { .. })));
        assert!(!events.iter().any(|e| matches!(e, Event::StartPrefixMapping { .. })));
    }

    #[test]
    fn buffered_drops_nested_empty_chain() {
        let xml = "<a><b><c/></b><d>x</d></a>";
        assert_eq!(elide(EmptyElementPolicy::Buffered, xml), "<a><d>x</d></a>");
    }

    #[test]
    fn buffered_replays_whitespace_and_comments() {
        let xml = "<a>\n  <!--c--><b>x</b>\n  <e> <f/> </e>\n</a>";
        assert_eq!(
            elide(EmptyElementPolicy::Buffered, xml),
            "<a>\n  <!--c--><b>x</b>\n  \n</a>"
        );
    }

    #[test]
    fn buffered_cdata_is_content() {
        let xml = "<a><b><![CDATA[]]></b></a>";
        assert_eq!(elide(EmptyElementPolicy::Buffered, xml), "<a><b><![CDATA[]]></b></a>");
    }

    #[test]
    fn buffered_attributes_force_emission() {
        let xml = r#"<a><b k="1"><c/></b></a>"#;
        assert_eq!(elide(EmptyElementPolicy::Buffered, xml), r#"<a><b k="1"/></a>"#);
    }

    #[test]
    fn buffered_whole_document_empty() {
        assert_eq!(elide(EmptyElementPolicy::Buffered, "<a> <b/> </a>"), "");
    }

    #[test]
    fn buffered_mappings_balanced() {
        let xml = r#"<a xmlns:p="urn:p"><p:b xmlns:q="urn:q"/><c>t</c></a>"#;
        let mut filter = BufferingEmptyElementFilter::new(EventRecorder::new());
        parse_str(xml, &mut filter).unwrap();
        assert_eq!(filter.pending_depth(), 0);
        let events = filter.into_inner().into_events();
        let starts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::StartPrefixMapping { prefix, .. } => Some(prefix.as_str()),
                _ => None,
            })
            .collect();
        let ends: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::EndPrefixMapping { prefix } => Some(prefix.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, ["p"]);
        assert_eq!(ends, ["p"]);
    }
}
