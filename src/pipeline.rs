//! Chain assembly from [`PipelineOptions`].
//!
//! Stage order, head to tail:
//!
//! ```text
//! placeholder → element → body-only → namespace removal → namespaced-contents removal
//!   → empty-element elision → pretty print → serializer
//! ```
//!
//! An [`XmlDebugger`] may wrap the head ("input") and the serializer ("output").

use std::io::{BufRead, Write};

use log::debug;

use crate::debug::XmlDebugger;
use crate::error::Location;
use crate::filter::{
    BodyOnlyFilter, ElementFilter, ElementFilterOptions, ElementSelector, EmptyElementFilter, ExceptionCatchingFilter,
    ExtractMode, NamespaceRemovingFilter, NamespacedContentsRemovingFilter, PlaceholderFilter, PrettyPrintFilter,
};
use crate::handler::ContentHandler;
use crate::options::PipelineOptions;
use crate::xml_writer::XmlWriter;
use crate::{Error, Result, xml};

/// Boxed stage chain.
pub type Chain<'a> = Box<dyn ContentHandler + 'a>;

/// Builds the filter chain in front of `sink`.
pub fn build<'a>(options: &'a PipelineOptions, sink: Chain<'a>, debugger: Option<&dyn XmlDebugger>) -> Result<Chain<'a>> {
    options.validate()?;
    let mut chain = sink;
    if let Some(debugger) = debugger {
        chain = debugger.inspect_xml("output", chain);
    }
    if let Some(pretty) = options.pretty() {
        chain = Box::new(PrettyPrintFilter::with_options(pretty.clone(), chain));
    }
    if let Some(policy) = options.skip_empty() {
        chain = Box::new(EmptyElementFilter::new(policy, chain));
    }
    if options.remove_namespaced_contents() {
        chain = Box::new(NamespacedContentsRemovingFilter::new(chain));
    }
    if options.remove_namespaces() {
        chain = Box::new(NamespaceRemovingFilter::new(chain));
    }
    if options.body_only() {
        chain = Box::new(BodyOnlyFilter::new(chain));
    }
    let selected = match (options.target_element(), options.container_element()) {
        (Some(target), _) => Some((target, ExtractMode::Target)),
        (None, Some(container)) => Some((container, ExtractMode::Container)),
        (None, None) => None,
    };
    if let Some((name, mode)) = selected {
        let element_options = ElementFilterOptions::new(ElementSelector::parse(name))
            .with_mode(mode)
            .with_include_root(options.include_root())
            .with_all_matches(options.all_matches());
        chain = Box::new(ElementFilter::new(element_options, chain));
    }
    if let Some(properties) = options.properties() {
        chain = Box::new(PlaceholderFilter::with_options(properties, options.placeholder().clone(), chain)?);
    }
    if let Some(debugger) = debugger {
        chain = debugger.inspect_xml("input", chain);
    }
    debug!("pipeline assembled: {options:?}");
    Ok(chain)
}

/// Builds the chain with an [`XmlWriter`] writing to `out` as its tail.
pub fn build_to_writer<'a, W: Write + 'a>(
    options: &'a PipelineOptions,
    out: W,
    debugger: Option<&dyn XmlDebugger>,
) -> Result<Chain<'a>> {
    let writer = XmlWriter::with_options(out, options.writer().clone());
    build(options, Box::new(writer), debugger)
}

/// Runs a document string through the configured chain and returns the output.
pub fn run_str(options: &PipelineOptions, xml: &str) -> Result<String> {
    let mut out = Vec::new();
    {
        let mut chain = build_to_writer(options, &mut out, None)?;
        xml::parse_str(xml, &mut chain)?;
    }
    String::from_utf8(out).map_err(|_| Error::Io("pipeline output is not valid UTF-8".into()))
}

/// Runs a document from `input` through the chain into `out`.
///
/// Stream errors without a position are tagged with `system_id`.
pub fn run_reader(
    options: &PipelineOptions,
    input: impl BufRead,
    system_id: Option<&str>,
    out: impl Write,
    debugger: Option<&dyn XmlDebugger>,
) -> Result<()> {
    let chain = build_to_writer(options, out, debugger)?;
    let mut head = ExceptionCatchingFilter::new(chain, |e| match (e, system_id) {
        (e @ Error::Stream { location: None, .. }, Some(id)) => e.with_location(Location::default().with_system_id(id)),
        (e, _) => e,
    });
    xml::parse_reader(input, system_id, &mut head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::LoggingDebugger;
    use crate::filter::{EmptyElementPolicy, PrettyPrintOptions};
    use crate::handler::EventRecorder;
    use indexmap::IndexMap;

    #[test]
    fn default_chain_is_identity() {
        let xml = r#"<a k="v" xmlns:p="urn:p"><p:b>t</p:b><!--c--></a>"#;
        assert_eq!(run_str(&PipelineOptions::default(), xml).unwrap(), xml);
    }

    #[test]
    fn invalid_options_fail_early() {
        let opts = PipelineOptions::default().with_target_element("a").with_container_element("b");
        assert!(matches!(run_str(&opts, "<a/>"), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn stages_compose() {
        let mut properties = IndexMap::new();
        properties.insert("who".to_string(), "world".to_string());
        let opts = PipelineOptions::default()
            .with_properties(properties)
            .with_container_element("list")
            .with_remove_namespaces()
            .with_skip_empty(EmptyElementPolicy::default())
            .with_pretty(PrettyPrintOptions::default().with_indent("  "));
        let xml = r#"<doc xmlns:x="urn:x"><list><x:item>hello ${who}</x:item><x:item/></list></doc>"#;
        assert_eq!(run_str(&opts, xml).unwrap(), "<item>hello world</item>");
    }

    #[test]
    fn debugger_is_transparent() {
        let opts = PipelineOptions::default().with_body_only();
        let mut recorder = EventRecorder::new();
        {
            let mut chain = build(&opts, Box::new(&mut recorder), Some(&LoggingDebugger)).unwrap();
            xml::parse_str("<r><a/></r>", &mut chain).unwrap();
        }
        assert_eq!(recorder.events().len(), 2);
    }

    #[test]
    fn reader_errors_carry_system_id() {
        let mut out = Vec::new();
        let err = run_reader(&PipelineOptions::default(), "<a><b></a>".as_bytes(), Some("in.xml"), &mut out, None)
            .unwrap_err();
        let location = err.location().expect("location");
        assert_eq!(location.system_id.as_deref(), Some("in.xml"));
    }
}
