use std::borrow::Cow;
use std::io::BufRead;

use memchr::memchr;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use super::ParseFlags;
use crate::attributes::Attributes;
use crate::error::Location;
use crate::event::is_whitespace;
use crate::handler::ContentHandler;
use crate::{Error, Result};

/// Offenes Element: Namensteile plus die von ihm deklarierten Prefixe.
struct OpenElement {
    uri: String,
    local_name: String,
    qname: String,
    prefixes: Vec<String>,
}

/// Fehlerkontext: Quelltext (fuer Zeile/Spalte) und System-Identifier.
struct Source<'s> {
    text: Option<&'s str>,
    system_id: Option<&'s str>,
}

impl Source<'_> {
    fn error(&self, message: impl Into<Cow<'static, str>>, offset: impl TryInto<usize>) -> Error {
        let offset = offset.try_into().unwrap_or(usize::MAX);
        let mut location = match self.text {
            Some(text) => Location::from_offset(text, offset),
            None => Location::default(),
        };
        if let Some(system_id) = self.system_id {
            location = location.with_system_id(system_id);
        }
        Error::parse(message, location)
    }

    /// Setzt die Position in einen Parse-Fehler ein; andere Fehler bleiben unveraendert.
    fn locate(&self, err: Error, offset: impl TryInto<usize>) -> Error {
        match err {
            Error::Parse { message, .. } => self.error(message, offset),
            other => other,
        }
    }
}

pub(crate) fn emit_events<R: BufRead>(
    mut reader: NsReader<R>,
    flags: &ParseFlags,
    text: Option<&str>,
    handler: &mut dyn ContentHandler,
) -> Result<()> {
    reader.config_mut().trim_text(false);
    let source = Source { text, system_id: flags.system_id.as_deref() };

    let mut buf = Vec::new();
    let mut open: Vec<OpenElement> = Vec::new();
    // CH-Coalescing: gepufferter Text wird vor jedem Nicht-CH-Event geflusht.
    let mut pending_ch: Option<String> = None;

    if !flags.fragment {
        handler.start_document()?;
    }

    loop {
        let offset = reader.buffer_position();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(source.error(format!("{e}"), reader.buffer_position()));
            }
        };
        match event {
            Event::Start(e) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let element = emit_start(&reader, &e, handler)
                    .map_err(|er| source.locate(er, offset))?;
                open.push(element);
            }
            Event::Empty(e) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let element = emit_start(&reader, &e, handler)
                    .map_err(|er| source.locate(er, offset))?;
                emit_end(element, handler)?;
            }
            Event::End(_) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let element = open
                    .pop()
                    .ok_or_else(|| source.error("unexpected end element at depth 0", offset))?;
                emit_end(element, handler)?;
            }
            Event::Text(e) => {
                let raw = normalize_line_endings(utf8(&e).map_err(|er| source.locate(er, offset))?);
                let value = quick_xml::escape::unescape(&raw)
                    .map_err(|er| source.error(er.to_string(), offset))?;
                if open.is_empty() && !flags.fragment {
                    if !is_whitespace(&value) {
                        return Err(source.error("character data outside root element", offset));
                    }
                } else if !value.is_empty() {
                    coalesce_ch(&mut pending_ch, &value);
                }
            }
            Event::CData(e) => {
                let raw = utf8(&e).map_err(|er| source.locate(er, offset))?;
                if open.is_empty() && !flags.fragment {
                    if !is_whitespace(raw) {
                        return Err(source.error("CDATA section outside root element", offset));
                    }
                } else {
                    flush_pending_ch(&mut pending_ch, handler)?;
                    handler.start_cdata()?;
                    if !raw.is_empty() {
                        handler.characters(&normalize_line_endings(raw))?;
                    }
                    handler.end_cdata()?;
                }
            }
            Event::Comment(e) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let text = utf8(&e).map_err(|er| source.locate(er, offset))?;
                handler.comment(&normalize_line_endings(text))?;
            }
            Event::PI(e) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let target = utf8(e.target()).map_err(|er| source.locate(er, offset))?;
                let data = utf8(e.content()).map_err(|er| source.locate(er, offset))?;
                // S zwischen PITarget und Daten ist Separator, nicht Teil der Daten.
                handler.processing_instruction(target, &normalize_line_endings(data.trim_start()))?;
            }
            Event::GeneralRef(e) => {
                let name = utf8(e.as_ref()).map_err(|er| source.locate(er, offset))?;
                if open.is_empty() && !flags.fragment {
                    // Referenz ausserhalb des Wurzelelements: ignoriert
                } else if let Some(rest) = name.strip_prefix('#') {
                    let ch = resolve_char_reference(rest).ok_or_else(|| {
                        source.error(format!("invalid character reference '&{name};'"), offset)
                    })?;
                    coalesce_ch(&mut pending_ch, ch.encode_utf8(&mut [0; 4]));
                } else if let Some(resolved) = resolve_predefined_entity(name) {
                    coalesce_ch(&mut pending_ch, resolved);
                } else {
                    flush_pending_ch(&mut pending_ch, handler)?;
                    handler.start_entity(name)?;
                    handler.end_entity(name)?;
                }
            }
            // DOCTYPE und XML-Deklaration erzeugen keine Events.
            Event::DocType(_) | Event::Decl(_) => {}
            Event::Eof => break,
        }
        buf.clear();
    }

    flush_pending_ch(&mut pending_ch, handler)?;
    if let Some(element) = open.last() {
        return Err(source.error(
            format!("unexpected end of input: element '{}' not closed", element.qname),
            reader.buffer_position(),
        ));
    }
    if !flags.fragment {
        handler.end_document()?;
    }
    Ok(())
}

/// Flusht gepufferte CH-Daten als Characters-Event.
fn flush_pending_ch(pending_ch: &mut Option<String>, handler: &mut dyn ContentHandler) -> Result<()> {
    if let Some(text) = pending_ch.take() {
        handler.characters(&text)?;
    }
    Ok(())
}

/// CH-Coalescing: Text an gepufferten CH-Wert anhaengen oder neuen starten.
fn coalesce_ch(pending_ch: &mut Option<String>, value: &str) {
    match pending_ch {
        Some(existing) => existing.push_str(value),
        None => *pending_ch = Some(value.to_string()),
    }
}

fn emit_start<R: BufRead>(
    reader: &NsReader<R>,
    e: &BytesStart<'_>,
    handler: &mut dyn ContentHandler,
) -> Result<OpenElement> {
    let (uri, local_name) = resolve_name(reader, e.name(), false)?;
    let qname = utf8(e.name().as_ref())?.to_string();

    let mut prefixes = Vec::new();
    let mut attributes = Attributes::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|er| parse_error(er.to_string()))?;
        let key = utf8(attr.key.as_ref())?;
        let raw = utf8(attr.value.as_ref())?;
        let raw = normalize_attribute_value(raw);
        let value = quick_xml::escape::unescape(&raw).map_err(|er| parse_error(er.to_string()))?;

        if let Some(prefix) = namespace_decl_prefix(key) {
            handler.start_prefix_mapping(prefix, &value)?;
            prefixes.push(prefix.to_string());
            continue;
        }
        let (attr_uri, attr_local) = resolve_name(reader, attr.key, true)?;
        attributes
            .add(&attr_uri, &attr_local, key, &value)
            .map_err(|er| parse_error(er.to_string()))?;
    }

    handler.start_element(&uri, &local_name, &qname, &attributes)?;
    Ok(OpenElement { uri, local_name, qname, prefixes })
}

fn emit_end(element: OpenElement, handler: &mut dyn ContentHandler) -> Result<()> {
    handler.end_element(&element.uri, &element.local_name, &element.qname)?;
    for prefix in element.prefixes.iter().rev() {
        handler.end_prefix_mapping(prefix)?;
    }
    Ok(())
}

/// `xmlns` → Some(""), `xmlns:p` → Some("p"), sonst None.
fn namespace_decl_prefix(key: &str) -> Option<&str> {
    if key == "xmlns" { Some("") } else { key.strip_prefix("xmlns:") }
}

fn resolve_name<R: BufRead>(
    reader: &NsReader<R>,
    name: XmlQName<'_>,
    attribute: bool,
) -> Result<(String, String)> {
    let (ns, local) = if attribute {
        reader.resolver().resolve_attribute(name)
    } else {
        reader.resolver().resolve_element(name)
    };
    let uri = match ns {
        ResolveResult::Bound(ns) => utf8(ns.as_ref())?.to_string(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(prefix) => {
            let prefix = String::from_utf8_lossy(&prefix);
            return Err(parse_error(format!("unbound namespace prefix '{prefix}'")));
        }
    };
    Ok((uri, utf8(local.as_ref())?.to_string()))
}

/// Parse-Fehler ohne Position; `emit_events` setzt die Position ein.
fn parse_error(message: impl Into<Cow<'static, str>>) -> Error {
    Error::parse(message, Location::default())
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|er| parse_error(format!("invalid UTF-8: {er}")))
}

/// XML 1.0 Sec. 3.3.3: Zeilenenden normalisieren, dann TAB/LF -> Leerzeichen.
/// Vor dem Unescaping, damit `&#9;` `&#10;` `&#13;` erhalten bleiben.
fn normalize_attribute_value(s: &str) -> Cow<'_, str> {
    if memchr::memchr3(b'\t', b'\n', b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(normalize_line_endings(s).replace(['\t', '\n'], " "))
}

/// XML 1.0 Sec. 2.11: \r\n -> \n, alleinstehende \r -> \n
fn normalize_line_endings(s: &str) -> Cow<'_, str> {
    if memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
}

/// `#x41` / `#65` ohne fuehrendes `#`.
fn resolve_char_reference(digits: &str) -> Option<char> {
    let code_point = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code_point)
}
