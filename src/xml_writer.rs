//! Terminal stage: events → XML text.
//!
//! Start tags are kept open until the next event so an element without
//! content is written self-closing (`<a/>`). Namespace declarations that are
//! new in scope are written after the element's attributes; a declaration
//! identical to the binding already in scope is skipped, which also keeps the
//! empty default namespace from being declared on the root.
//!
//! Two processing instruction targets are reserved and never written:
//! [`PI_DISABLE_OUTPUT_ESCAPING`] and [`PI_ENABLE_OUTPUT_ESCAPING`] switch
//! character escaping off and on.
//!
//! Convenience APIs:
//! - `events_to_xml()`: owned events → XML string.
//! - `events_to_pretty_xml()`: same, indented by the pretty printer.

use std::io::Write;

use crate::attributes::Attributes;
use crate::event::{Event, send_all};
use crate::filter::pretty::PrettyPrintFilter;
use crate::handler::ContentHandler;
use crate::namespace::NamespaceScope;
use crate::{Error, Result};

/// PI target that turns character escaping off.
pub const PI_DISABLE_OUTPUT_ESCAPING: &str = "javax.xml.transform.disable-output-escaping";
/// PI target that turns character escaping back on.
pub const PI_ENABLE_OUTPUT_ESCAPING: &str = "javax.xml.transform.enable-output-escaping";

/// Serialisiert owned Events als XML-String.
pub fn events_to_xml(events: &[Event]) -> Result<String> {
    let mut writer = XmlWriter::new(Vec::new());
    send_all(events, &mut writer)?;
    writer.into_string()
}

/// Serialisiert owned Events als eingerueckten XML-String (Tab-Einzug).
pub fn events_to_pretty_xml(events: &[Event]) -> Result<String> {
    let mut pretty = PrettyPrintFilter::new(XmlWriter::new(Vec::new()));
    send_all(events, &mut pretty)?;
    pretty.into_inner().into_string()
}

/// Output settings of [`XmlWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Write comments (default: true).
    pub include_comments: bool,
    /// Write only character data, unescaped; all markup is suppressed.
    pub text_mode: bool,
    /// Write `<?xml version="1.0" encoding="UTF-8"?>` on `start_document`.
    pub xml_declaration: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self { include_comments: true, text_mode: false, xml_declaration: false }
    }
}

impl WriterOptions {
    pub fn with_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }

    pub fn with_text_mode(mut self, text_mode: bool) -> Self {
        self.text_mode = text_mode;
        self
    }

    pub fn with_xml_declaration(mut self, declaration: bool) -> Self {
        self.xml_declaration = declaration;
        self
    }
}

/// Schreibt einen String als Bytes in den Writer.
#[inline]
fn w(writer: &mut impl Write, s: &str) -> Result<()> {
    Ok(writer.write_all(s.as_bytes())?)
}

/// XML-Escaping mit memchr3-SIMD: grosse Bloecke ohne Escape-Zeichen werden
/// in einem Stueck geschrieben. `quote` escaped zusaetzlich `"`.
fn write_escaped(writer: &mut impl Write, s: &str, quote: bool) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let rest = &bytes[start..];
        let markup = memchr::memchr3(b'&', b'<', b'>', rest);
        // Parser normalisieren CR immer, im Attribut auch TAB/LF.
        let control = if quote {
            min_hit(memchr::memchr(b'"', rest), memchr::memchr3(b'\n', b'\r', b'\t', rest))
        } else {
            memchr::memchr(b'\r', rest)
        };
        let Some(offset) = min_hit(markup, control) else {
            writer.write_all(rest)?;
            break;
        };
        let pos = start + offset;
        writer.write_all(&bytes[start..pos])?;
        let replacement: &[u8] = match bytes[pos] {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'\n' => b"&#10;",
            b'\r' => b"&#13;",
            b'\t' => b"&#9;",
            _ => b"&quot;",
        };
        writer.write_all(replacement)?;
        start = pos + 1;
    }
    Ok(())
}

fn min_hit(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Text-Escaping: & < > → &amp; &lt; &gt;, CR → &#13;
fn write_escaped_text(writer: &mut impl Write, s: &str) -> Result<()> {
    write_escaped(writer, s, false)
}

/// Attribut-Escaping: & < > " → &amp; &lt; &gt; &quot;, TAB/LF/CR als Zeichenreferenz (Apostroph bleibt).
fn write_escaped_attr(writer: &mut impl Write, s: &str) -> Result<()> {
    write_escaped(writer, s, true)
}

fn xmlns_qname(prefix: &str) -> String {
    if prefix.is_empty() { "xmlns".to_string() } else { format!("xmlns:{prefix}") }
}

/// Streaming XML serializer, schreibt direkt in `W: Write`.
#[derive(Debug)]
pub struct XmlWriter<W: Write> {
    writer: W,
    options: WriterOptions,
    depth: usize,
    /// Start tag written up to its attributes, `>` or `/>` still missing.
    tag_open: bool,
    in_cdata: bool,
    escaping: bool,
    scope: NamespaceScope,
    pending_ns: Vec<(String, String)>,
    /// Entity whose replacement text has not produced output yet.
    pending_entity: Option<String>,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_options(writer, WriterOptions::default())
    }

    pub fn with_options(writer: W, options: WriterOptions) -> Self {
        Self {
            writer,
            options,
            depth: 0,
            tag_open: false,
            in_cdata: false,
            escaping: true,
            scope: NamespaceScope::new(),
            pending_ns: Vec::new(),
            pending_entity: None,
        }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Schliesst einen offenen Start-Tag mit `>`.
    fn close_start_tag(&mut self) -> Result<()> {
        self.pending_entity = None;
        if self.tag_open {
            self.tag_open = false;
            if !self.options.text_mode {
                w(&mut self.writer, ">")?;
            }
        }
        Ok(())
    }

    fn write_namespace_decls(&mut self, attributes: &Attributes) -> Result<()> {
        for (prefix, uri) in std::mem::take(&mut self.pending_ns) {
            let redundant = self.scope.resolve(&prefix).unwrap_or("") == uri;
            let qname = xmlns_qname(&prefix);
            if !redundant && attributes.index_of(&qname).is_none() && !self.options.text_mode {
                w(&mut self.writer, " ")?;
                w(&mut self.writer, &qname)?;
                w(&mut self.writer, "=\"")?;
                write_escaped_attr(&mut self.writer, &uri)?;
                w(&mut self.writer, "\"")?;
            }
            self.scope.push(&prefix, &uri);
        }
        Ok(())
    }
}

impl XmlWriter<Vec<u8>> {
    /// Ausgabe-Puffer als String.
    pub fn into_string(self) -> Result<String> {
        String::from_utf8(self.writer).map_err(|_| Error::Io("XML output is not valid UTF-8".into()))
    }
}

impl<W: Write> ContentHandler for XmlWriter<W> {
    fn start_document(&mut self) -> Result<()> {
        if self.options.xml_declaration && !self.options.text_mode {
            w(&mut self.writer, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.close_start_tag()?;
        self.writer.flush()?;
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.pending_ns.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        // Mapping ohne zugehoeriges Element: nur aus pending entfernen.
        if let Some(pos) = self.pending_ns.iter().rposition(|(p, _)| p == prefix) {
            self.pending_ns.remove(pos);
            return Ok(());
        }
        self.scope.pop(prefix).map(|_| ())
    }

    fn start_element(
        &mut self,
        _uri: &str,
        _local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.close_start_tag()?;
        self.depth += 1;
        if !self.options.text_mode {
            w(&mut self.writer, "<")?;
            w(&mut self.writer, qname)?;
            for attr in attributes {
                w(&mut self.writer, " ")?;
                w(&mut self.writer, &attr.qname)?;
                w(&mut self.writer, "=\"")?;
                write_escaped_attr(&mut self.writer, &attr.value)?;
                w(&mut self.writer, "\"")?;
            }
        }
        self.write_namespace_decls(attributes)?;
        self.tag_open = true;
        Ok(())
    }

    fn end_element(&mut self, _uri: &str, _local_name: &str, qname: &str) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::UnbalancedEndElement(qname.to_string()));
        }
        self.depth -= 1;
        self.pending_entity = None;
        if self.options.text_mode {
            self.tag_open = false;
        } else if self.tag_open {
            self.tag_open = false;
            w(&mut self.writer, "/>")?;
        } else {
            w(&mut self.writer, "</")?;
            w(&mut self.writer, qname)?;
            w(&mut self.writer, ">")?;
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.close_start_tag()?;
        if self.in_cdata || !self.escaping || self.options.text_mode {
            w(&mut self.writer, text)
        } else {
            write_escaped_text(&mut self.writer, text)
        }
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        if !self.options.include_comments || self.options.text_mode {
            return Ok(());
        }
        self.close_start_tag()?;
        w(&mut self.writer, "<!--")?;
        w(&mut self.writer, text)?;
        w(&mut self.writer, "-->")
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.close_start_tag()?;
        self.in_cdata = true;
        if self.options.text_mode {
            return Ok(());
        }
        w(&mut self.writer, "<![CDATA[")
    }

    fn end_cdata(&mut self) -> Result<()> {
        self.in_cdata = false;
        if self.options.text_mode {
            return Ok(());
        }
        w(&mut self.writer, "]]>")
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        match target {
            PI_DISABLE_OUTPUT_ESCAPING => {
                self.escaping = false;
                return Ok(());
            }
            PI_ENABLE_OUTPUT_ESCAPING => {
                self.escaping = true;
                return Ok(());
            }
            _ => {}
        }
        if self.options.text_mode {
            return Ok(());
        }
        self.close_start_tag()?;
        w(&mut self.writer, "<?")?;
        w(&mut self.writer, target)?;
        if !data.is_empty() {
            w(&mut self.writer, " ")?;
            w(&mut self.writer, data)?;
        }
        w(&mut self.writer, "?>")
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        self.close_start_tag()?;
        self.pending_entity = Some(name.to_string());
        Ok(())
    }

    /// Eine Entity ohne Ersetzungstext wird als Referenz `&name;` geschrieben.
    fn end_entity(&mut self, name: &str) -> Result<()> {
        if self.pending_entity.take().as_deref() == Some(name) && !self.options.text_mode {
            w(&mut self.writer, "&")?;
            w(&mut self.writer, name)?;
            w(&mut self.writer, ";")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(f: impl FnOnce(&mut XmlWriter<Vec<u8>>) -> Result<()>) -> String {
        let mut writer = XmlWriter::new(Vec::new());
        f(&mut writer).unwrap();
        writer.into_string().unwrap()
    }

    #[test]
    fn escape_text_ampersand() {
        let mut buf = Vec::new();
        write_escaped_text(&mut buf, "a&b").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a&amp;b");
    }

    #[test]
    fn escape_text_lt_gt() {
        let mut buf = Vec::new();
        write_escaped_text(&mut buf, "a<b>c").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a&lt;b&gt;c");
    }

    #[test]
    fn escape_text_keeps_quotes() {
        let mut buf = Vec::new();
        write_escaped_text(&mut buf, r#"say "hi" it's"#).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), r#"say "hi" it's"#);
    }

    #[test]
    fn escape_attr_quote_but_not_apostrophe() {
        let mut buf = Vec::new();
        write_escaped_attr(&mut buf, r#"a"b'c<&>"#).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a&quot;b'c&lt;&amp;&gt;");
    }

    #[test]
    fn escape_whitespace_references() {
        let mut buf = Vec::new();
        write_escaped_attr(&mut buf, "a\nb\tc\rd").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a&#10;b&#9;c&#13;d");

        let mut buf = Vec::new();
        write_escaped_text(&mut buf, "a\nb\tc\r\nd").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a\nb\tc&#13;\nd");
    }

    #[test]
    fn self_closing_and_nested() {
        let xml = write(|wr| {
            let none = Attributes::empty();
            wr.start_document()?;
            wr.start_element("", "a", "a", none)?;
            wr.start_element("", "b", "b", none)?;
            wr.end_element("", "b", "b")?;
            wr.characters("x")?;
            wr.end_element("", "a", "a")?;
            wr.end_document()
        });
        assert_eq!(xml, "<a><b/>x</a>");
    }

    #[test]
    fn unbalanced_end_element() {
        let mut wr = XmlWriter::new(Vec::new());
        let err = wr.end_element("", "a", "a").unwrap_err();
        assert!(matches!(err, Error::UnbalancedEndElement(n) if n == "a"));
    }

    #[test]
    fn namespace_decls_after_attributes() {
        let xml = write(|wr| {
            let attrs = Attributes::from_pairs([("id", "1")])?;
            wr.start_prefix_mapping("", "")?;
            wr.start_prefix_mapping("p", "urn:p")?;
            wr.start_element("urn:p", "a", "p:a", &attrs)?;
            wr.start_prefix_mapping("p", "urn:p")?;
            wr.start_element("urn:p", "b", "p:b", Attributes::empty())?;
            wr.end_element("urn:p", "b", "p:b")?;
            wr.end_prefix_mapping("p")?;
            wr.end_element("urn:p", "a", "p:a")?;
            wr.end_prefix_mapping("p")?;
            wr.end_prefix_mapping("")
        });
        assert_eq!(xml, r#"<p:a id="1" xmlns:p="urn:p"><p:b/></p:a>"#);
    }

    #[test]
    fn rebinding_is_declared_again() {
        let xml = write(|wr| {
            wr.start_prefix_mapping("", "urn:a")?;
            wr.start_element("urn:a", "r", "r", Attributes::empty())?;
            wr.start_prefix_mapping("", "")?;
            wr.start_element("", "c", "c", Attributes::empty())?;
            wr.end_element("", "c", "c")?;
            wr.end_prefix_mapping("")?;
            wr.end_element("urn:a", "r", "r")?;
            wr.end_prefix_mapping("")
        });
        assert_eq!(xml, r#"<r xmlns="urn:a"><c xmlns=""/></r>"#);
    }

    #[test]
    fn namespace_underflow_is_error() {
        let mut wr = XmlWriter::new(Vec::new());
        assert!(matches!(wr.end_prefix_mapping("q"), Err(Error::NamespaceUnderflow(_))));
    }

    #[test]
    fn cdata_comment_pi() {
        let xml = write(|wr| {
            wr.start_element("", "a", "a", Attributes::empty())?;
            wr.start_cdata()?;
            wr.characters("<raw>&")?;
            wr.end_cdata()?;
            wr.comment(" note ")?;
            wr.processing_instruction("go", "")?;
            wr.processing_instruction("run", "fast")?;
            wr.end_element("", "a", "a")
        });
        assert_eq!(xml, "<a><![CDATA[<raw>&]]><!-- note --><?go?><?run fast?></a>");
    }

    #[test]
    fn output_escaping_toggle() {
        let xml = write(|wr| {
            wr.start_element("", "a", "a", Attributes::empty())?;
            wr.characters("<")?;
            wr.processing_instruction(PI_DISABLE_OUTPUT_ESCAPING, "")?;
            wr.characters("<b/>")?;
            wr.processing_instruction(PI_ENABLE_OUTPUT_ESCAPING, "")?;
            wr.characters(">")?;
            wr.end_element("", "a", "a")
        });
        assert_eq!(xml, "<a>&lt;<b/>&gt;</a>");
    }

    #[test]
    fn comments_suppressed() {
        let mut wr = XmlWriter::with_options(Vec::new(), WriterOptions::default().with_comments(false));
        wr.start_element("", "a", "a", Attributes::empty()).unwrap();
        wr.comment("hidden").unwrap();
        wr.end_element("", "a", "a").unwrap();
        assert_eq!(wr.into_string().unwrap(), "<a/>");
    }

    #[test]
    fn text_mode_writes_only_character_data() {
        let mut wr = XmlWriter::with_options(Vec::new(), WriterOptions::default().with_text_mode(true));
        let attrs = Attributes::from_pairs([("k", "v")]).unwrap();
        wr.start_document().unwrap();
        wr.start_prefix_mapping("p", "urn:p").unwrap();
        wr.start_element("", "a", "a", &attrs).unwrap();
        wr.characters("1 < 2").unwrap();
        wr.comment("c").unwrap();
        wr.start_element("", "b", "b", Attributes::empty()).unwrap();
        wr.characters(" & more").unwrap();
        wr.end_element("", "b", "b").unwrap();
        wr.end_element("", "a", "a").unwrap();
        wr.end_prefix_mapping("p").unwrap();
        wr.end_document().unwrap();
        assert_eq!(wr.into_string().unwrap(), "1 < 2 & more");
    }

    #[test]
    fn xml_declaration() {
        let mut wr =
            XmlWriter::with_options(Vec::new(), WriterOptions::default().with_xml_declaration(true));
        wr.start_document().unwrap();
        wr.start_element("", "a", "a", Attributes::empty()).unwrap();
        wr.end_element("", "a", "a").unwrap();
        wr.end_document().unwrap();
        assert_eq!(wr.into_string().unwrap(), r#"<?xml version="1.0" encoding="UTF-8"?><a/>"#);
    }

    #[test]
    fn unresolved_entity_written_as_reference() {
        let xml = write(|wr| {
            wr.start_element("", "a", "a", Attributes::empty())?;
            wr.start_entity("nbsp")?;
            wr.end_entity("nbsp")?;
            wr.end_element("", "a", "a")
        });
        assert_eq!(xml, "<a>&nbsp;</a>");
    }

    #[test]
    fn events_to_xml_roundtrip() {
        let events = vec![
            Event::StartDocument,
            Event::start_element("", "r", "r", Attributes::from_pairs([("a", "x\"y")]).unwrap()),
            Event::Characters("t&t".into()),
            Event::end_element("", "r", "r"),
            Event::EndDocument,
        ];
        assert_eq!(events_to_xml(&events).unwrap(), r#"<r a="x&quot;y">t&amp;t</r>"#);
    }
}
