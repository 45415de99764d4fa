//! Pipeline configuration.
//!
//! [`PipelineOptions`] selects which stages [`crate::pipeline::build`] puts
//! into a chain and how each of them is set up. Stages that are not selected
//! are left out entirely.
//!
//! # Beispiel
//!
//! ```
//! use saxpipe::filter::{EmptyElementPolicy, PrettyPrintOptions};
//! use saxpipe::options::PipelineOptions;
//!
//! let opts = PipelineOptions::default()
//!     .with_target_element("item")
//!     .with_skip_empty(EmptyElementPolicy::Buffered)
//!     .with_pretty(PrettyPrintOptions::default().with_indent("  "));
//!
//! assert!(opts.validate().is_ok());
//! assert_eq!(opts.target_element(), Some("item"));
//! assert!(opts.with_container_element("list").validate().is_err());
//! ```

use indexmap::IndexMap;

use crate::filter::{EmptyElementPolicy, PlaceholderOptions, PrettyPrintOptions};
use crate::xml_writer::WriterOptions;
use crate::{Error, Result};

/// Stage selection and per-stage settings of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    properties: Option<IndexMap<String, String>>,
    placeholder: PlaceholderOptions,
    target_element: Option<String>,
    container_element: Option<String>,
    include_root: bool,
    all_matches: bool,
    body_only: bool,
    remove_namespaces: bool,
    remove_namespaced_contents: bool,
    skip_empty: Option<EmptyElementPolicy>,
    pretty: Option<PrettyPrintOptions>,
    writer: WriterOptions,
}

impl PipelineOptions {
    // --- Getter ---

    /// Property table; substitution is active when set.
    pub fn properties(&self) -> Option<&IndexMap<String, String>> { self.properties.as_ref() }

    pub fn placeholder(&self) -> &PlaceholderOptions { &self.placeholder }

    pub fn target_element(&self) -> Option<&str> { self.target_element.as_deref() }

    pub fn container_element(&self) -> Option<&str> { self.container_element.as_deref() }

    pub fn include_root(&self) -> bool { self.include_root }

    /// Extract every occurrence of the selected element, not only the first.
    pub fn all_matches(&self) -> bool { self.all_matches }

    pub fn body_only(&self) -> bool { self.body_only }

    pub fn remove_namespaces(&self) -> bool { self.remove_namespaces }

    pub fn remove_namespaced_contents(&self) -> bool { self.remove_namespaced_contents }

    pub fn skip_empty(&self) -> Option<EmptyElementPolicy> { self.skip_empty }

    pub fn pretty(&self) -> Option<&PrettyPrintOptions> { self.pretty.as_ref() }

    pub fn writer(&self) -> &WriterOptions { &self.writer }

    // --- Builder ---

    pub fn with_properties(mut self, properties: IndexMap<String, String>) -> Self { self.properties = Some(properties); self }

    pub fn with_placeholder(mut self, placeholder: PlaceholderOptions) -> Self { self.placeholder = placeholder; self }

    pub fn with_target_element(mut self, element: impl Into<String>) -> Self { self.target_element = Some(element.into()); self }

    pub fn with_container_element(mut self, element: impl Into<String>) -> Self { self.container_element = Some(element.into()); self }

    pub fn with_include_root(mut self) -> Self { self.include_root = true; self }

    pub fn with_all_matches(mut self) -> Self { self.all_matches = true; self }

    pub fn with_body_only(mut self) -> Self { self.body_only = true; self }

    pub fn with_remove_namespaces(mut self) -> Self { self.remove_namespaces = true; self }

    pub fn with_remove_namespaced_contents(mut self) -> Self { self.remove_namespaced_contents = true; self }

    pub fn with_skip_empty(mut self, policy: EmptyElementPolicy) -> Self { self.skip_empty = Some(policy); self }

    pub fn with_pretty(mut self, pretty: PrettyPrintOptions) -> Self { self.pretty = Some(pretty); self }

    pub fn with_writer(mut self, writer: WriterOptions) -> Self { self.writer = writer; self }

    // --- Setter ---

    pub fn set_properties(&mut self, properties: Option<IndexMap<String, String>>) { self.properties = properties; }

    pub fn set_target_element(&mut self, element: Option<String>) { self.target_element = element; }

    pub fn set_container_element(&mut self, element: Option<String>) { self.container_element = element; }

    pub fn set_include_root(&mut self, val: bool) { self.include_root = val; }

    pub fn set_all_matches(&mut self, val: bool) { self.all_matches = val; }

    pub fn set_body_only(&mut self, val: bool) { self.body_only = val; }

    pub fn set_remove_namespaces(&mut self, val: bool) { self.remove_namespaces = val; }

    pub fn set_remove_namespaced_contents(&mut self, val: bool) { self.remove_namespaced_contents = val; }

    pub fn set_skip_empty(&mut self, policy: Option<EmptyElementPolicy>) { self.skip_empty = policy; }

    pub fn set_pretty(&mut self, pretty: Option<PrettyPrintOptions>) { self.pretty = pretty; }

    pub fn set_writer(&mut self, writer: WriterOptions) { self.writer = writer; }

    /// Rejects contradictory settings.
    pub fn validate(&self) -> Result<()> {
        if self.target_element.is_some() && self.container_element.is_some() {
            return Err(Error::InvalidOptions("target and container element are mutually exclusive".into()));
        }
        if self.include_root && self.target_element.is_none() && self.container_element.is_none() {
            return Err(Error::InvalidOptions("include_root needs a target or container element".into()));
        }
        if self.all_matches && self.target_element.is_none() && self.container_element.is_none() {
            return Err(Error::InvalidOptions("all_matches needs a target or container element".into()));
        }
        if self.target_element.as_deref() == Some("") || self.container_element.as_deref() == Some("") {
            return Err(Error::InvalidOptions("empty element name".into()));
        }
        if self.properties.is_some() {
            self.placeholder.validate()?;
        }
        // Text-Modus schreibt kein Markup, Einrueckung waere reiner Whitespace-Muell.
        if self.writer.text_mode && self.pretty.is_some() {
            return Err(Error::InvalidOptions("pretty printing has no effect in text mode".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_pass_through() {
        let opts = PipelineOptions::default();
        assert!(opts.validate().is_ok());
        assert!(opts.properties().is_none());
        assert!(opts.skip_empty().is_none());
        assert!(opts.pretty().is_none());
        assert!(!opts.body_only());
    }

    #[test]
    fn target_and_container_conflict() {
        let opts = PipelineOptions::default().with_target_element("a").with_container_element("b");
        assert!(matches!(opts.validate(), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn include_root_needs_selector() {
        assert!(PipelineOptions::default().with_include_root().validate().is_err());
        assert!(PipelineOptions::default().with_include_root().with_container_element("c").validate().is_ok());
    }

    #[test]
    fn all_matches_needs_selector() {
        assert!(PipelineOptions::default().with_all_matches().validate().is_err());
        assert!(PipelineOptions::default().with_all_matches().with_target_element("t").validate().is_ok());
    }

    #[test]
    fn empty_delimiters_rejected() {
        let opts = PipelineOptions::default()
            .with_properties(IndexMap::new())
            .with_placeholder(PlaceholderOptions::default().with_delimiters("", "}"));
        assert!(opts.validate().is_err());
    }

    #[test]
    fn pretty_in_text_mode_rejected() {
        let opts = PipelineOptions::default()
            .with_writer(WriterOptions::default().with_text_mode(true))
            .with_pretty(PrettyPrintOptions::default());
        assert!(opts.validate().is_err());
    }

    #[test]
    fn setters_mirror_builders() {
        let mut opts = PipelineOptions::default();
        opts.set_target_element(Some("x".into()));
        opts.set_skip_empty(Some(EmptyElementPolicy::Buffered));
        assert_eq!(opts, PipelineOptions::default().with_target_element("x").with_skip_empty(EmptyElementPolicy::Buffered));
    }
}
