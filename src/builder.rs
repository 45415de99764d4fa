//! Programmatic event emission.
//!
//! [`DocumentBuilder`] owns the sink and a stack of open element frames. An
//! [`ElementBuilder`] borrows the document builder, so only the innermost
//! element can be modified and a parent cannot be touched while a child is
//! open.
//!
//! The `StartElement` of a frame is deferred until its first child, value or
//! close, so attributes can be added until then. Afterwards the frame is
//! closed for attributes and [`Error::FrameClosed`] is returned.
//!
//! # Beispiel
//!
//! ```
//! use saxpipe::builder::DocumentBuilder;
//! use saxpipe::xml_writer::XmlWriter;
//!
//! let mut doc = DocumentBuilder::with_root("order", XmlWriter::new(Vec::new())).unwrap();
//! doc.add_attribute("id", "17").unwrap();
//! {
//!     let mut line = doc.start_element("line").unwrap();
//!     line.add_attribute("qty", "2").unwrap();
//!     line.add_value("apples").unwrap();
//! }
//! doc.add_element("note", None).unwrap();
//! let xml = doc.finish().unwrap().into_string().unwrap();
//! assert_eq!(xml, r#"<order id="17"><line qty="2">apples</line><note/></order>"#);
//! ```

use log::{error, trace};

use crate::attributes::Attributes;
use crate::filter::PrettyPrintFilter;
use crate::handler::ContentHandler;
use crate::{Error, Result};

#[derive(Debug)]
struct Frame {
    name: String,
    attributes: Attributes,
    flushed: bool,
}

/// Owner of the sink and the open-element stack.
pub struct DocumentBuilder<H: ContentHandler> {
    handler: H,
    frames: Vec<Frame>,
    document: bool,
}

impl<H: ContentHandler> DocumentBuilder<H> {
    /// Fragment builder: no document events, any number of top-level nodes.
    pub fn new(handler: H) -> Self {
        Self { handler, frames: Vec::new(), document: false }
    }

    /// Emits `StartDocument` and opens the root element.
    pub fn with_root(root: &str, handler: H) -> Result<Self> {
        let mut doc = Self { handler, frames: Vec::new(), document: true };
        doc.handler.start_document()?;
        doc.push(root)?;
        Ok(doc)
    }

    pub fn get_ref(&self) -> &H {
        &self.handler
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Adds an attribute to the innermost open element (the root, unless a
    /// fragment builder has none).
    pub fn add_attribute(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let Some(depth) = self.frames.len().checked_sub(1) else {
            return Err(Error::stream(format!("no open element for attribute '{name}'")));
        };
        self.attribute(depth, name, value)?;
        Ok(self)
    }

    pub fn add_value(&mut self, text: &str) -> Result<&mut Self> {
        self.flush_top()?;
        self.handler.characters(text)?;
        Ok(self)
    }

    pub fn add_comment(&mut self, text: &str) -> Result<&mut Self> {
        self.flush_top()?;
        self.handler.comment(text)?;
        Ok(self)
    }

    /// Opens a child of the innermost open element.
    pub fn start_element(&mut self, name: &str) -> Result<ElementBuilder<'_, H>> {
        self.push(name)?;
        let depth = self.frames.len() - 1;
        Ok(ElementBuilder { doc: self, depth, closed: false })
    }

    /// `<name>value</name>`, or an empty element without value.
    pub fn add_element(&mut self, name: &str, value: Option<&str>) -> Result<&mut Self> {
        self.start_element(name)?.finish_with(&[], value)?;
        Ok(self)
    }

    /// Closes every open element, ends the document and returns the sink.
    pub fn finish(mut self) -> Result<H> {
        self.close(0)?;
        if self.document {
            self.handler.end_document()?;
        }
        Ok(self.handler)
    }

    fn push(&mut self, name: &str) -> Result<()> {
        self.flush_top()?;
        self.frames.push(Frame { name: name.to_string(), attributes: Attributes::new(), flushed: false });
        Ok(())
    }

    fn attribute(&mut self, depth: usize, name: &str, value: &str) -> Result<()> {
        match self.frames.get_mut(depth) {
            Some(frame) if !frame.flushed => frame.attributes.add("", name, name, value),
            Some(frame) => Err(Error::FrameClosed(frame.name.clone())),
            None => Err(Error::FrameClosed(name.to_string())),
        }
    }

    /// Emits the deferred `StartElement` of the innermost frame.
    fn flush_top(&mut self) -> Result<()> {
        if let Some(frame) = self.frames.last_mut()
            && !frame.flushed
        {
            frame.flushed = true;
            let attributes = std::mem::take(&mut frame.attributes);
            self.handler.start_element("", &frame.name, &frame.name, &attributes)?;
        }
        Ok(())
    }

    /// Closes the frame at `depth` and everything above it.
    fn close(&mut self, depth: usize) -> Result<()> {
        while self.frames.len() > depth {
            self.flush_top()?;
            if let Some(frame) = self.frames.pop() {
                trace!("closing element '{}'", frame.name);
                self.handler.end_element("", &frame.name, &frame.name)?;
            }
        }
        Ok(())
    }
}

impl<H: ContentHandler> DocumentBuilder<PrettyPrintFilter<H>> {
    /// Like [`DocumentBuilder::with_root`], indenting the output.
    pub fn pretty(root: &str, handler: H) -> Result<Self> {
        Self::with_root(root, PrettyPrintFilter::new(handler))
    }
}

/// Handle on one open element. Dropping it closes the element.
pub struct ElementBuilder<'a, H: ContentHandler> {
    doc: &'a mut DocumentBuilder<H>,
    depth: usize,
    closed: bool,
}

impl<H: ContentHandler> ElementBuilder<'_, H> {
    /// Fails with [`Error::FrameClosed`] once the start tag was emitted.
    pub fn add_attribute(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.doc.attribute(self.depth, name, value)?;
        Ok(self)
    }

    pub fn add_value(&mut self, text: &str) -> Result<&mut Self> {
        self.doc.add_value(text)?;
        Ok(self)
    }

    pub fn add_comment(&mut self, text: &str) -> Result<&mut Self> {
        self.doc.add_comment(text)?;
        Ok(self)
    }

    pub fn start_element(&mut self, name: &str) -> Result<ElementBuilder<'_, H>> {
        self.doc.start_element(name)
    }

    /// Child element with attributes and an optional value, closed immediately.
    pub fn add_element(&mut self, name: &str, attributes: &[(&str, &str)], value: Option<&str>) -> Result<&mut Self> {
        self.doc.start_element(name)?.finish_with(attributes, value)?;
        Ok(self)
    }

    /// Emits the end tag and returns control to the parent.
    pub fn end_element(mut self) -> Result<()> {
        self.closed = true;
        self.doc.close(self.depth)
    }

    fn finish_with(mut self, attributes: &[(&str, &str)], value: Option<&str>) -> Result<()> {
        for (name, v) in attributes {
            self.add_attribute(name, v)?;
        }
        if let Some(value) = value {
            self.add_value(value)?;
        }
        self.end_element()
    }
}

impl<H: ContentHandler> Drop for ElementBuilder<'_, H> {
    fn drop(&mut self) {
        if !self.closed
            && let Err(e) = self.doc.close(self.depth)
        {
            error!("closing element on drop failed: {e}");
        }
    }
}
