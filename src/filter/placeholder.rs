//! Placeholder substitution (`${key}` → property value).
//!
//! Text arrives in arbitrary chunks, so a placeholder may be split over several
//! `characters` calls. The filter keeps the unfinished tail (an incomplete
//! placeholder or a trailing prefix of the start delimiter) and prepends it to
//! the next chunk. Any other event flushes the tail as literal text.
//!
//! Values are resolved recursively: placeholders inside a value or inside a
//! key are expanded as well. `${key:-default}` supplies a literal fallback for
//! a missing key; a missing key without fallback resolves to the empty string.
//! A value that mentions its own placeholder is emitted verbatim, an indirect
//! cycle (`a -> b -> a`) fails with [`Error::CircularReference`].
//!
//! With [`PlaceholderOptions::markup`] a resolved value is parsed as a markup
//! fragment and replayed as events instead of being emitted as text.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use indexmap::IndexMap;
use log::{trace, warn};

use crate::attributes::Attributes;
use crate::handler::ContentHandler;
use crate::{Error, Result, xml};

/// Trennt Schluessel und Default in `${key:-default}`.
const DEFAULT_SEPARATOR: &str = ":-";

/// Read-only property table.
pub trait PropertySource {
    fn get_property(&self, key: &str) -> Option<&str>;
}

impl<S: BuildHasher> PropertySource for IndexMap<String, String, S> {
    fn get_property(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl<S: BuildHasher> PropertySource for HashMap<String, String, S> {
    fn get_property(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl PropertySource for BTreeMap<String, String> {
    fn get_property(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl<P: PropertySource + ?Sized> PropertySource for &P {
    fn get_property(&self, key: &str) -> Option<&str> {
        (**self).get_property(key)
    }
}

/// Settings of [`PlaceholderFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderOptions {
    pub start: String,
    pub stop: String,
    /// Also substitute placeholders in attribute values.
    pub resolve_attributes: bool,
    /// Parse resolved values as markup (element-content variant).
    pub markup: bool,
}

impl Default for PlaceholderOptions {
    fn default() -> Self {
        Self { start: "${".to_string(), stop: "}".to_string(), resolve_attributes: false, markup: false }
    }
}

impl PlaceholderOptions {
    pub fn with_delimiters(mut self, start: impl Into<String>, stop: impl Into<String>) -> Self {
        self.start = start.into();
        self.stop = stop.into();
        self
    }

    /// Rejects empty delimiters; an empty start would match at every position.
    pub fn validate(&self) -> Result<()> {
        if self.start.is_empty() || self.stop.is_empty() {
            return Err(Error::InvalidOptions("placeholder delimiters must not be empty".into()));
        }
        if self.start == self.stop {
            return Err(Error::InvalidOptions(
                format!("placeholder start and stop delimiter are both '{}'", self.start).into(),
            ));
        }
        Ok(())
    }

    pub fn with_resolve_attributes(mut self, resolve: bool) -> Self {
        self.resolve_attributes = resolve;
        self
    }

    pub fn with_markup(mut self, markup: bool) -> Self {
        self.markup = markup;
        self
    }
}

/// Expansion result: literal text or a resolved value.
#[derive(Debug, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Resolved(String),
}

fn push_literal(out: &mut Vec<Piece>, text: &str) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(Piece::Literal(last)) => last.push_str(text),
        _ => out.push(Piece::Literal(text.to_string())),
    }
}

fn concat(pieces: Vec<Piece>) -> String {
    pieces
        .into_iter()
        .map(|p| match p {
            Piece::Literal(s) | Piece::Resolved(s) => s,
        })
        .collect()
}

struct Expander<'a, P: ?Sized> {
    properties: &'a P,
    start: &'a str,
    stop: &'a str,
}

impl<P: PropertySource + ?Sized> Expander<'_, P> {
    /// Expands `text` into `out` and returns the number of bytes consumed.
    ///
    /// With `partial` an incomplete trailing placeholder, or a trailing prefix
    /// of the start delimiter, is left unconsumed.
    fn expand(&self, text: &str, partial: bool, stack: &mut Vec<String>, out: &mut Vec<Piece>) -> Result<usize> {
        let mut pos = 0;
        while pos < text.len() {
            let Some(rel) = text[pos..].find(self.start) else {
                let rest = &text[pos..];
                let keep = if partial { self.partial_start_len(rest) } else { 0 };
                push_literal(out, &rest[..rest.len() - keep]);
                return Ok(text.len() - keep);
            };
            let begin = pos + rel;
            push_literal(out, &text[pos..begin]);
            let key_start = begin + self.start.len();
            let Some(end) = self.find_stop(text, key_start) else {
                if partial {
                    return Ok(begin);
                }
                push_literal(out, &text[begin..]);
                return Ok(text.len());
            };
            self.resolve(&text[key_start..end], stack, out)?;
            pos = end + self.stop.len();
        }
        Ok(text.len())
    }

    /// Position of the stop delimiter matching a start at `from`, nest-aware.
    fn find_stop(&self, text: &str, from: usize) -> Option<usize> {
        let mut depth = 1usize;
        let mut i = from;
        while i < text.len() {
            let rest = &text[i..];
            if rest.starts_with(self.start) {
                depth += 1;
                i += self.start.len();
            } else if rest.starts_with(self.stop) {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
                i += self.stop.len();
            } else {
                i += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
        None
    }

    /// Length of the longest suffix of `text` that is a proper prefix of the start delimiter.
    fn partial_start_len(&self, text: &str) -> usize {
        (1..self.start.len())
            .rev()
            .find(|&n| {
                n <= text.len()
                    && text.is_char_boundary(text.len() - n)
                    && self.start.is_char_boundary(n)
                    && text.ends_with(&self.start[..n])
            })
            .unwrap_or(0)
    }

    /// Splits `key:-default` at the first separator outside nested placeholders.
    fn split_default<'k>(&self, raw_key: &'k str) -> (&'k str, Option<&'k str>) {
        let mut depth = 0usize;
        let mut i = 0;
        while i < raw_key.len() {
            let rest = &raw_key[i..];
            if rest.starts_with(self.start) {
                depth += 1;
                i += self.start.len();
            } else if depth > 0 && rest.starts_with(self.stop) {
                depth -= 1;
                i += self.stop.len();
            } else if depth == 0 && rest.starts_with(DEFAULT_SEPARATOR) {
                return (&raw_key[..i], Some(&rest[DEFAULT_SEPARATOR.len()..]));
            } else {
                i += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
        (raw_key, None)
    }

    fn resolve(&self, raw_key: &str, stack: &mut Vec<String>, out: &mut Vec<Piece>) -> Result<()> {
        let (raw_name, default) = self.split_default(raw_key);
        let mut key_pieces = Vec::new();
        self.expand(raw_name, false, stack, &mut key_pieces)?;
        let key = concat(key_pieces);
        if stack.contains(&key) {
            return Err(Error::CircularReference(key));
        }
        let Some(value) = self.properties.get_property(&key) else {
            match default {
                Some(default) => {
                    trace!("placeholder '{key}' missing, using default");
                    out.push(Piece::Resolved(default.to_string()));
                }
                None => {
                    warn!("no value for placeholder '{key}', resolved to empty");
                    out.push(Piece::Resolved(String::new()));
                }
            }
            return Ok(());
        };
        let own = format!("{}{key}{}", self.start, self.stop);
        if value.contains(&own) {
            trace!("placeholder '{key}' refers to itself, value kept verbatim");
            out.push(Piece::Resolved(value.to_string()));
            return Ok(());
        }
        trace!("placeholder '{key}' resolved");
        stack.push(key);
        let mut pieces = Vec::new();
        let result = self.expand(value, false, stack, &mut pieces);
        stack.pop();
        result?;
        out.push(Piece::Resolved(concat(pieces)));
        Ok(())
    }

    /// Fully expands `text` into one string.
    fn substitute(&self, text: &str) -> Result<String> {
        let mut pieces = Vec::new();
        self.expand(text, false, &mut Vec::new(), &mut pieces)?;
        Ok(concat(pieces))
    }
}

/// Substitutes all placeholders in `text` (default `${`/`}` delimiters).
pub fn substitute(text: &str, properties: &impl PropertySource) -> Result<String> {
    let options = PlaceholderOptions::default();
    Expander { properties, start: &options.start, stop: &options.stop }.substitute(text)
}

/// Placeholder substitution stage.
pub struct PlaceholderFilter<H, P> {
    inner: H,
    properties: P,
    options: PlaceholderOptions,
    /// Unverbrauchter Rest aus vorherigen `characters` Aufrufen.
    carry: String,
}

inner_access!(PlaceholderFilter<H, P>);

impl<H: ContentHandler, P: PropertySource> PlaceholderFilter<H, P> {
    pub fn new(properties: P, inner: H) -> Self {
        Self { inner, properties, options: PlaceholderOptions::default(), carry: String::new() }
    }

    pub fn with_options(properties: P, options: PlaceholderOptions, inner: H) -> Result<Self> {
        options.validate()?;
        Ok(Self { inner, properties, options, carry: String::new() })
    }

    pub fn properties(&self) -> &P {
        &self.properties
    }

    fn expander(&self) -> Expander<'_, P> {
        Expander { properties: &self.properties, start: &self.options.start, stop: &self.options.stop }
    }

    fn emit(&mut self, pieces: Vec<Piece>) -> Result<()> {
        for piece in pieces {
            match piece {
                Piece::Literal(text) => self.inner.characters(&text)?,
                Piece::Resolved(value) if self.options.markup => xml::parse_fragment(&value, &mut self.inner)?,
                Piece::Resolved(value) => {
                    if !value.is_empty() {
                        self.inner.characters(&value)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Emits the carried tail as far as it can be expanded, the rest literally.
    fn flush(&mut self) -> Result<()> {
        if self.carry.is_empty() {
            return Ok(());
        }
        let carry = std::mem::take(&mut self.carry);
        let mut pieces = Vec::new();
        self.expander().expand(&carry, false, &mut Vec::new(), &mut pieces)?;
        self.emit(pieces)
    }
}

impl<H: ContentHandler, P: PropertySource> ContentHandler for PlaceholderFilter<H, P> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn start_document(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.start_document()
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.flush()?;
        self.inner.start_prefix_mapping(prefix, uri)
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.flush()?;
        self.inner.end_prefix_mapping(prefix)
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        self.flush()?;
        self.inner.start_entity(name)
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        self.flush()?;
        self.inner.end_entity(name)
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.flush()?;
        if !self.options.resolve_attributes
            || !attributes.iter().any(|a| a.value.contains(self.options.start.as_str()))
        {
            return self.inner.start_element(uri, local_name, qname, attributes);
        }
        let expander = self.expander();
        let resolved = Attributes::try_derive(attributes, |_, _| true, false, |a| {
            expander.substitute(&a.value).map(Cow::Owned)
        })?;
        self.inner.start_element(uri, local_name, qname, &resolved)
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        self.flush()?;
        self.inner.end_element(uri, local_name, qname)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.carry.push_str(text);
        let carry = std::mem::take(&mut self.carry);
        let mut pieces = Vec::new();
        let consumed = self.expander().expand(&carry, true, &mut Vec::new(), &mut pieces)?;
        self.carry = carry[consumed..].to_string();
        self.emit(pieces)
    }

    fn end_document(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.end_document()
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.flush()?;
        self.inner.comment(text)
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.start_cdata()
    }

    fn end_cdata(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.end_cdata()
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.flush()?;
        self.inner.processing_instruction(target, data)
    }
}
