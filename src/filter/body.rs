//! Body-only filter: drops `start_document`/`end_document` and, unless told
//! otherwise, the start and end of the outermost element.

use crate::Result;
use crate::attributes::Attributes;
use crate::handler::ContentHandler;

pub struct BodyOnlyFilter<H> {
    inner: H,
    skip_root: bool,
    depth: usize,
}

inner_access!(BodyOnlyFilter<H>);

impl<H: ContentHandler> BodyOnlyFilter<H> {
    /// Strips document events and the root element.
    pub fn new(inner: H) -> Self {
        Self { inner, skip_root: true, depth: 0 }
    }

    /// Whether the root element's start and end are dropped (default: true).
    pub fn with_skip_root(mut self, skip_root: bool) -> Self {
        self.skip_root = skip_root;
        self
    }
}

impl<H: ContentHandler> ContentHandler for BodyOnlyFilter<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.depth += 1;
        if self.skip_root && self.depth == 1 {
            return Ok(());
        }
        self.inner.start_element(uri, local_name, qname, attributes)
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        let depth = self.depth;
        self.depth = depth.saturating_sub(1);
        if self.skip_root && depth == 1 {
            return Ok(());
        }
        self.inner.end_element(uri, local_name, qname)
    }
}
