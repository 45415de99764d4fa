//! Pretty printer.
//!
//! Drops whitespace-only text in element-only content and inserts a newline
//! plus one indent string per level before every start tag, comment and
//! processing instruction, and before an end tag whose element had child
//! nodes. Elements that carry non-whitespace text (mixed content) are left
//! untouched, so running the filter over its own output changes nothing.

use crate::Result;
use crate::attributes::Attributes;
use crate::event::is_whitespace;
use crate::handler::ContentHandler;

/// Settings of [`PrettyPrintFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrettyPrintOptions {
    /// Indent string per nesting level (default: one tab).
    pub indent: String,
    /// Sort attributes by local name and namespace mappings by prefix.
    pub sort_attributes: bool,
}

impl Default for PrettyPrintOptions {
    fn default() -> Self {
        Self { indent: "\t".to_string(), sort_attributes: false }
    }
}

impl PrettyPrintOptions {
    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn with_sort_attributes(mut self, sort: bool) -> Self {
        self.sort_attributes = sort;
        self
    }
}

pub struct PrettyPrintFilter<H> {
    inner: H,
    options: PrettyPrintOptions,
    level: usize,
    /// Irgendetwas wurde bereits ausgegeben (kein Umbruch vor dem ersten Knoten).
    output_seen: bool,
    /// Pro offenem Element: Nicht-Whitespace-Text gesehen.
    text_seen: Vec<bool>,
    /// Das aktuelle Element hatte Kind-Knoten (Elemente, Kommentare, PIs).
    element_content_seen: bool,
    pending_mappings: Vec<(String, String)>,
}

inner_access!(PrettyPrintFilter<H>);

impl<H: ContentHandler> PrettyPrintFilter<H> {
    pub fn new(inner: H) -> Self {
        Self::with_options(PrettyPrintOptions::default(), inner)
    }

    pub fn with_options(options: PrettyPrintOptions, inner: H) -> Self {
        Self {
            inner,
            options,
            level: 0,
            output_seen: false,
            text_seen: Vec::new(),
            element_content_seen: false,
            pending_mappings: Vec::new(),
        }
    }

    fn in_text(&self) -> bool {
        self.text_seen.last().copied().unwrap_or(false)
    }

    /// Umbruch + Einzug vor einem Knoten, ausser in Mixed Content.
    fn indent(&mut self, level: usize) -> Result<()> {
        if self.in_text() {
            return Ok(());
        }
        self.newline(level)
    }

    fn newline(&mut self, level: usize) -> Result<()> {
        if self.output_seen {
            let mut ws = String::with_capacity(1 + self.options.indent.len() * level);
            ws.push('\n');
            for _ in 0..level {
                ws.push_str(&self.options.indent);
            }
            self.inner.characters(&ws)?;
        }
        self.output_seen = true;
        Ok(())
    }

    fn flush_mappings(&mut self) -> Result<()> {
        let mut mappings = std::mem::take(&mut self.pending_mappings);
        if self.options.sort_attributes {
            mappings.sort_by(|a, b| a.0.cmp(&b.0));
        }
        for (prefix, uri) in mappings {
            self.inner.start_prefix_mapping(&prefix, &uri)?;
        }
        Ok(())
    }

    fn mark_text(&mut self) {
        if let Some(seen) = self.text_seen.last_mut() {
            *seen = true;
        }
        self.output_seen = true;
    }
}

impl<H: ContentHandler> ContentHandler for PrettyPrintFilter<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.pending_mappings.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.indent(self.level)?;
        self.flush_mappings()?;
        if self.options.sort_attributes {
            self.inner.start_element(uri, local_name, qname, &attributes.sorted())?;
        } else {
            self.inner.start_element(uri, local_name, qname, attributes)?;
        }
        self.level += 1;
        self.text_seen.push(false);
        self.element_content_seen = false;
        Ok(())
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        self.level = self.level.saturating_sub(1);
        let had_text = self.text_seen.pop().unwrap_or(false);
        if self.element_content_seen && !had_text {
            self.newline(self.level)?;
        }
        self.element_content_seen = true;
        self.inner.end_element(uri, local_name, qname)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() || (is_whitespace(text) && !self.in_text()) {
            return Ok(());
        }
        self.mark_text();
        self.inner.characters(text)
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.mark_text();
        self.inner.start_cdata()
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.indent(self.level)?;
        self.element_content_seen = true;
        self.inner.comment(text)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.indent(self.level)?;
        self.element_content_seen = true;
        self.inner.processing_instruction(target, data)
    }
}
