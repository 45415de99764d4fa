//! Subtree extraction.
//!
//! [`ElementFilter`] forwards only the part of the stream that belongs to a
//! matched element: the element itself with its subtree ([`ExtractMode::Target`])
//! or only its children ([`ExtractMode::Container`]). Two counters drive the
//! decision: `global_level` is the absolute element depth and `level` the depth
//! relative to the current match (0 while no match is open). Only the first
//! matching element is extracted; with [`ElementFilterOptions::all_matches`]
//! the filter is armed again after each match closes.
//!
//! Namespace bindings declared outside the match but in scope at the match
//! are replayed before the first forwarded element and ended after it, so the
//! extracted fragment stays namespace-well-formed. Upstream prefix mapping
//! events are never forwarded as such.

use log::{debug, trace};

use crate::Result;
use crate::attributes::Attributes;
use crate::handler::ContentHandler;
use crate::namespace::NamespaceScope;

/// Which element to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSelector {
    /// Matches the local name in any namespace.
    Local(String),
    /// Matches namespace URI and local name.
    Qualified { uri: String, local_name: String },
}

impl ElementSelector {
    /// Parses `local` or Clark notation `{uri}local`.
    pub fn parse(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix('{')
            && let Some((uri, local_name)) = rest.split_once('}')
        {
            return Self::Qualified { uri: uri.to_string(), local_name: local_name.to_string() };
        }
        Self::Local(s.to_string())
    }

    pub fn matches(&self, uri: &str, local_name: &str) -> bool {
        match self {
            Self::Local(name) => name == local_name,
            Self::Qualified { uri: u, local_name: l } => u == uri && l == local_name,
        }
    }
}

impl From<&str> for ElementSelector {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

/// Was von einem Treffer weitergegeben wird.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractMode {
    /// The matched element and its subtree.
    #[default]
    Target,
    /// Only the children of the matched element.
    Container,
}

/// Settings of [`ElementFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFilterOptions {
    pub selector: ElementSelector,
    pub mode: ExtractMode,
    /// Also forward the start and end of the document's root element.
    pub include_root: bool,
    /// Extract every occurrence instead of only the first.
    pub all_matches: bool,
}

impl ElementFilterOptions {
    pub fn new(selector: impl Into<ElementSelector>) -> Self {
        Self { selector: selector.into(), mode: ExtractMode::Target, include_root: false, all_matches: false }
    }

    pub fn with_mode(mut self, mode: ExtractMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_include_root(mut self, include_root: bool) -> Self {
        self.include_root = include_root;
        self
    }

    pub fn with_all_matches(mut self, all_matches: bool) -> Self {
        self.all_matches = all_matches;
        self
    }
}

struct Frame {
    forwarded: bool,
    /// Prefixe, deren Mapping mit diesem Element weitergegeben wurde.
    mappings: Vec<String>,
}

/// Subtree extraction filter (target or container variant).
pub struct ElementFilter<H> {
    inner: H,
    options: ElementFilterOptions,
    global_level: usize,
    level: usize,
    scope: NamespaceScope,
    pending: Vec<(String, String)>,
    frames: Vec<Frame>,
    matches: usize,
}

inner_access!(ElementFilter<H>);

impl<H: ContentHandler> ElementFilter<H> {
    pub fn new(options: ElementFilterOptions, inner: H) -> Self {
        Self {
            inner,
            options,
            global_level: 0,
            level: 0,
            scope: NamespaceScope::new(),
            pending: Vec::new(),
            frames: Vec::new(),
            matches: 0,
        }
    }

    /// Forwards the first matched element with its subtree.
    pub fn target(selector: impl Into<ElementSelector>, inner: H) -> Self {
        Self::new(ElementFilterOptions::new(selector), inner)
    }

    /// Forwards only the children of the first matched element.
    pub fn container(selector: impl Into<ElementSelector>, inner: H) -> Self {
        Self::new(ElementFilterOptions::new(selector).with_mode(ExtractMode::Container), inner)
    }

    pub fn with_include_root(mut self, include_root: bool) -> Self {
        self.options.include_root = include_root;
        self
    }

    /// Number of matched elements so far.
    pub fn match_count(&self) -> usize {
        self.matches
    }

    fn armed(&self) -> bool {
        self.matches == 0 || self.options.all_matches
    }

    /// Depth inside the match at which forwarding starts.
    fn region_level(&self) -> usize {
        match self.options.mode {
            ExtractMode::Target => 1,
            ExtractMode::Container => 2,
        }
    }

    /// Character-level content is forwarded inside the target or container.
    fn in_content(&self) -> bool {
        self.level >= 1
    }

    fn forward_mappings(&mut self, bindings: Vec<(String, String)>) -> Result<Vec<String>> {
        let mut prefixes = Vec::with_capacity(bindings.len());
        for (prefix, uri) in bindings {
            self.inner.start_prefix_mapping(&prefix, &uri)?;
            prefixes.push(prefix);
        }
        Ok(prefixes)
    }
}

impl<H: ContentHandler> ContentHandler for ElementFilter<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.scope.push(prefix, uri);
        self.pending.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.scope.pop(prefix).map(|_| ())
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.global_level += 1;
        if self.level > 0 {
            self.level += 1;
        } else if self.armed() && self.options.selector.matches(uri, local_name) {
            self.level = 1;
            self.matches += 1;
            debug!("element '{qname}' matched at depth {}", self.global_level);
        }

        let region = self.region_level();
        let is_root = self.global_level == 1 && self.options.include_root;
        let forwarded = self.level >= region || is_root;
        let pending = std::mem::take(&mut self.pending);

        let mappings = if !forwarded {
            trace!("element '{qname}' skipped");
            Vec::new()
        } else if self.level == region {
            let in_scope = self
                .scope
                .in_scope()
                .into_iter()
                .map(|(p, u)| (p.to_string(), u.to_string()))
                .collect();
            self.forward_mappings(in_scope)?
        } else {
            self.forward_mappings(pending)?
        };

        if forwarded {
            self.inner.start_element(uri, local_name, qname, attributes)?;
        }
        self.frames.push(Frame { forwarded, mappings });
        Ok(())
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        if let Some(frame) = self.frames.pop()
            && frame.forwarded
        {
            self.inner.end_element(uri, local_name, qname)?;
            for prefix in frame.mappings.iter().rev() {
                self.inner.end_prefix_mapping(prefix)?;
            }
        }
        if self.level > 0 {
            self.level -= 1;
            if self.level == 0 {
                trace!("match '{qname}' closed");
            }
        }
        self.global_level = self.global_level.saturating_sub(1);
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if self.in_content() { self.inner.characters(text) } else { Ok(()) }
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        if self.in_content() { self.inner.comment(text) } else { Ok(()) }
    }

    fn start_cdata(&mut self) -> Result<()> {
        if self.in_content() { self.inner.start_cdata() } else { Ok(()) }
    }

    fn end_cdata(&mut self) -> Result<()> {
        if self.in_content() { self.inner.end_cdata() } else { Ok(()) }
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        if self.in_content() { self.inner.processing_instruction(target, data) } else { Ok(()) }
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        if self.in_content() { self.inner.start_entity(name) } else { Ok(()) }
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        if self.in_content() { self.inner.end_entity(name) } else { Ok(()) }
    }
}
