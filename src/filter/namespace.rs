//! Namespace normalization filters.
//!
//! - [`NamespaceRemovingFilter`] moves every element and attribute to the
//!   empty namespace and drops all namespace declarations.
//! - [`NamespacedContentsRemovingFilter`] removes every element with a
//!   non-empty namespace URI together with its subtree, plus all namespaced
//!   attributes.
//!
//! Neither filter forwards prefix mapping events: after them nothing is left
//! that a declaration could bind.

use std::borrow::Cow;

use log::{debug, warn};

use crate::Result;
use crate::attributes::{Attribute, Attributes};
use crate::handler::ContentHandler;

fn is_namespace_decl(attr: &Attribute) -> bool {
    attr.qname == "xmlns" || attr.qname.starts_with("xmlns:")
}

/// Local part of an attribute, falling back to the qname's suffix.
fn local_part(attr: &Attribute) -> &str {
    if !attr.local_name.is_empty() {
        return &attr.local_name;
    }
    attr.qname.rsplit_once(':').map_or(attr.qname.as_str(), |(_, local)| local)
}

/// Strips all namespace information from the stream.
pub struct NamespaceRemovingFilter<H> {
    inner: H,
}

inner_access!(NamespaceRemovingFilter<H>);

impl<H: ContentHandler> NamespaceRemovingFilter<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    fn strip_attributes(attributes: &Attributes) -> Result<Attributes> {
        let mut stripped = Attributes::new();
        for attr in attributes.iter().filter(|a| !is_namespace_decl(a)) {
            let local = local_part(attr);
            if stripped.index_of(local).is_some() {
                warn!("attribute '{}' collides with '{local}' after namespace removal, dropped", attr.qname);
                continue;
            }
            stripped.add_typed("", local, local, &attr.attr_type, &attr.value)?;
        }
        Ok(stripped)
    }
}

impl<H: ContentHandler> ContentHandler for NamespaceRemovingFilter<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) -> Result<()> {
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn start_element(
        &mut self,
        _uri: &str,
        local_name: &str,
        _qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        let attributes = Self::strip_attributes(attributes)?;
        self.inner.start_element("", local_name, local_name, &attributes)
    }

    fn end_element(&mut self, _uri: &str, local_name: &str, _qname: &str) -> Result<()> {
        self.inner.end_element("", local_name, local_name)
    }
}

/// Removes namespaced elements (with their subtrees) and namespaced attributes.
pub struct NamespacedContentsRemovingFilter<H> {
    inner: H,
    removing_depth: usize,
}

inner_access!(NamespacedContentsRemovingFilter<H>);

impl<H: ContentHandler> NamespacedContentsRemovingFilter<H> {
    pub fn new(inner: H) -> Self {
        Self { inner, removing_depth: 0 }
    }

    fn removing(&self) -> bool {
        self.removing_depth > 0
    }
}

impl<H: ContentHandler> ContentHandler for NamespacedContentsRemovingFilter<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) -> Result<()> {
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        if self.removing() {
            self.removing_depth += 1;
            return Ok(());
        }
        if !uri.is_empty() {
            debug!("removing namespaced element '{qname}' ({uri})");
            self.removing_depth = 1;
            return Ok(());
        }
        let attributes = Attributes::derive(
            attributes,
            |_, a| a.uri.is_empty() && !is_namespace_decl(a),
            false,
            |a| Cow::Borrowed(&a.value),
        );
        self.inner.start_element(uri, local_name, qname, &attributes)
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        if self.removing() {
            self.removing_depth -= 1;
            return Ok(());
        }
        self.inner.end_element(uri, local_name, qname)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if self.removing() { Ok(()) } else { self.inner.characters(text) }
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        if self.removing() { Ok(()) } else { self.inner.comment(text) }
    }

    fn start_cdata(&mut self) -> Result<()> {
        if self.removing() { Ok(()) } else { self.inner.start_cdata() }
    }

    fn end_cdata(&mut self) -> Result<()> {
        if self.removing() { Ok(()) } else { self.inner.end_cdata() }
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        if self.removing() { Ok(()) } else { self.inner.processing_instruction(target, data) }
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        if self.removing() { Ok(()) } else { self.inner.start_entity(name) }
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        if self.removing() { Ok(()) } else { self.inner.end_entity(name) }
    }
}
