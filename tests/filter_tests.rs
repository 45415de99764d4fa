//! Integrationstests fuer zusammengesetzte Filter-Ketten.

use indexmap::IndexMap;
use saxpipe::filter::{
    ElementFilter, EmptyElementPolicy, NamespaceRemovingFilter, PlaceholderOptions, PrettyPrintFilter,
    PrettyPrintOptions,
};
use saxpipe::handler::EventRecorder;
use saxpipe::options::PipelineOptions;
use saxpipe::pipeline::run_str;
use saxpipe::xml::parse_str;
use saxpipe::xml_writer::{WriterOptions, XmlWriter};
use saxpipe::{Error, Event};

const DOC: &str = r#"<root><a><target x="1"><b/></target></a></root>"#;

fn props(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

// ============================================================================
// Einzelne Stufen ueber PipelineOptions
// ============================================================================

/// Zielelement mit Teilbaum.
#[test]
fn target_element() {
    let opts = PipelineOptions::default().with_target_element("target");
    assert_eq!(run_str(&opts, DOC).unwrap(), r#"<target x="1"><b/></target>"#);
}

/// Zielelement eingebettet in das Wurzelelement.
#[test]
fn target_element_with_root() {
    let opts = PipelineOptions::default().with_target_element("target").with_include_root();
    assert_eq!(run_str(&opts, DOC).unwrap(), r#"<root><target x="1"><b/></target></root>"#);
}

/// Container: nur die Kinder werden weitergegeben.
#[test]
fn container_element() {
    let opts = PipelineOptions::default().with_container_element("target");
    assert_eq!(run_str(&opts, DOC).unwrap(), "<b/>");
}

/// Qualifizierter Selektor `{uri}local` trifft nur den passenden Namespace.
#[test]
fn qualified_selector() {
    let xml = r#"<r xmlns:p="urn:p"><p:item>1</p:item><item>2</item></r>"#;
    let opts = PipelineOptions::default().with_target_element("{urn:p}item").with_remove_namespaces();
    assert_eq!(run_str(&opts, xml).unwrap(), "<item>1</item>");
}

/// Dokument-Events und Wurzel entfallen.
#[test]
fn body_only() {
    let opts = PipelineOptions::default().with_body_only();
    assert_eq!(run_str(&opts, "<root>a<b/>c</root>").unwrap(), "a<b/>c");
}

/// Namespaces entfernt, Attribute behalten ihren lokalen Namen.
#[test]
fn remove_namespaces() {
    let xml = r#"<p:a xmlns:p="urn:p" p:k="v"><p:b/></p:a>"#;
    let opts = PipelineOptions::default().with_remove_namespaces();
    assert_eq!(run_str(&opts, xml).unwrap(), r#"<a k="v"><b/></a>"#);
}

/// Namespace-Inhalte samt Teilbaum entfernt.
#[test]
fn remove_namespaced_contents() {
    let xml = r#"<r xmlns:p="urn:p"><p:x>gone<y/></p:x><i a="1" p:b="2">2</i></r>"#;
    let opts = PipelineOptions::default().with_remove_namespaced_contents();
    assert_eq!(run_str(&opts, xml).unwrap(), r#"<r><i a="1">2</i></r>"#);
}

/// Gepufferte Elision entfernt verschachtelte leere Elemente komplett.
#[test]
fn skip_empty_buffered() {
    let xml = r#"<a><b><c/></b><d>x</d><e k="1"/></a>"#;
    let opts = PipelineOptions::default().with_skip_empty(EmptyElementPolicy::Buffered);
    assert_eq!(run_str(&opts, xml).unwrap(), r#"<a><d>x</d><e k="1"/></a>"#);
}

/// Einstufige Elision: Attribute zaehlen nur auf Wunsch als Inhalt.
#[test]
fn skip_empty_single_level() {
    let xml = r#"<a><b/><e k="1"/><d>x</d></a>"#;
    let opts = PipelineOptions::default().with_skip_empty(EmptyElementPolicy::SingleLevel { attributes_are_content: false });
    assert_eq!(run_str(&opts, xml).unwrap(), "<a><d>x</d></a>");
    let opts = PipelineOptions::default().with_skip_empty(EmptyElementPolicy::SingleLevel { attributes_are_content: true });
    assert_eq!(run_str(&opts, xml).unwrap(), r#"<a><e k="1"/><d>x</d></a>"#);
}

/// Platzhalter in Text und, falls aktiviert, in Attributen.
#[test]
fn placeholders_in_text_and_attributes() {
    let xml = r#"<link href="http://${host}/x">${host}</link>"#;
    let opts = PipelineOptions::default().with_properties(props(&[("host", "example.org")]));
    assert_eq!(run_str(&opts, xml).unwrap(), r#"<link href="http://${host}/x">example.org</link>"#);

    let opts = opts.with_placeholder(PlaceholderOptions::default().with_resolve_attributes(true));
    assert_eq!(run_str(&opts, xml).unwrap(), r#"<link href="http://example.org/x">example.org</link>"#);
}

/// Sortierte Attribute beim Pretty-Print.
#[test]
fn pretty_sorted_attributes() {
    let opts = PipelineOptions::default().with_pretty(PrettyPrintOptions::default().with_sort_attributes(true));
    assert_eq!(run_str(&opts, r#"<r b="2" a="1"><c/></r>"#).unwrap(), "<r a=\"1\" b=\"2\">\n\t<c/>\n</r>");
}

/// Text-Modus hinter der Extraktion.
#[test]
fn text_mode_after_extraction() {
    let xml = "<r><t>a<b>b</b></t><x>skip</x><t>c</t></r>";
    let opts = PipelineOptions::default()
        .with_target_element("t")
        .with_writer(WriterOptions::default().with_text_mode(true));
    assert_eq!(run_str(&opts, xml).unwrap(), "ab");
    assert_eq!(run_str(&opts.with_all_matches(), xml).unwrap(), "abc");
}

// ============================================================================
// Komposition
// ============================================================================

/// Alle Stufen zusammen.
#[test]
fn full_chain() {
    let xml = r#"<doc xmlns:n="urn:n">
  <list>
    <n:item>${a}</n:item>
    <item><empty/></item>
    <item>${b}</item>
  </list>
</doc>"#;
    let opts = PipelineOptions::default()
        .with_properties(props(&[("a", "1"), ("b", "2")]))
        .with_container_element("list")
        .with_include_root()
        .with_remove_namespaced_contents()
        .with_skip_empty(EmptyElementPolicy::Buffered)
        .with_pretty(PrettyPrintOptions::default().with_indent("  "));
    assert_eq!(run_str(&opts, xml).unwrap(), "<doc>\n  <item>2</item>\n</doc>");
}

/// Ergebnis der Kette ist unabhaengig davon, ob sie ueber Optionen oder von Hand gebaut wird.
#[test]
fn manual_chain_matches_pipeline() {
    let xml = r#"<p:r xmlns:p="urn:p"><p:a><p:t k="v">x</p:t></p:a></p:r>"#;
    let mut manual = NamespaceRemovingFilter::new(PrettyPrintFilter::new(XmlWriter::new(Vec::new())));
    {
        let mut head = ElementFilter::target("t", &mut manual);
        parse_str(xml, &mut head).unwrap();
    }
    let manual = manual.into_inner().into_inner().into_string().unwrap();

    let opts = PipelineOptions::default()
        .with_target_element("t")
        .with_remove_namespaces()
        .with_pretty(PrettyPrintOptions::default());
    assert_eq!(run_str(&opts, xml).unwrap(), manual);
    assert_eq!(manual, r#"<t k="v">x</t>"#);
}

/// Prefix-Mappings des Ziels werden aus dem Scope nachgereicht und wieder beendet.
#[test]
fn extraction_replays_namespace_scope() {
    let xml = r#"<r xmlns:p="urn:p"><p:t/></r>"#;
    let mut filter = ElementFilter::target("t", EventRecorder::new());
    parse_str(xml, &mut filter).unwrap();
    let events = filter.into_inner().into_events();
    let starts = events.iter().filter(|e| matches!(e, Event::StartPrefixMapping { prefix, uri } if prefix == "p" && uri == "urn:p")).count();
    let ends = events.iter().filter(|e| matches!(e, Event::EndPrefixMapping { prefix } if prefix == "p")).count();
    assert_eq!((starts, ends), (1, 1));
    assert_eq!(saxpipe::xml_writer::events_to_xml(&events).unwrap(), r#"<p:t xmlns:p="urn:p"/>"#);
}

// ============================================================================
// Fehler
// ============================================================================

#[test]
fn conflicting_selectors_rejected() {
    let opts = PipelineOptions::default().with_target_element("a").with_container_element("b");
    assert!(matches!(run_str(&opts, "<a/>"), Err(Error::InvalidOptions(_))));
}

#[test]
fn include_root_without_selector_rejected() {
    let opts = PipelineOptions::default().with_include_root();
    assert!(matches!(run_str(&opts, "<a/>"), Err(Error::InvalidOptions(_))));
}

#[test]
fn malformed_input_fails() {
    assert!(run_str(&PipelineOptions::default(), "<a><b></a>").is_err());
}
