//! Per-element attribute snapshots.
//!
//! An [`Attributes`] view is an ordered list of `(uri, local_name, qname,
//! type, value)` tuples addressable by qualified name and by namespace URI +
//! local name. Keys are unique within one view. Stages that need to keep an
//! attribute list beyond the current event clone it (value semantics), so a
//! buffered snapshot can never be changed by a later stage.
//!
//! # Beispiel
//!
//! ```
//! use saxpipe::attributes::Attributes;
//!
//! let mut attrs = Attributes::new();
//! attrs.add("", "id", "id", "42").unwrap();
//! attrs.add("urn:x", "lang", "x:lang", "de").unwrap();
//!
//! assert_eq!(attrs.value_of("id"), Some("42"));
//! assert_eq!(attrs.value_of_ns("urn:x", "lang"), Some("de"));
//! assert_eq!(attrs.index_of("x:lang"), Some(1));
//! ```

use std::borrow::Cow;
use std::ops::Deref;

use crate::{Error, Result};

/// Attribute type reported when the producer does not know better.
pub const CDATA: &str = "CDATA";

static EMPTY: Attributes = Attributes { entries: Vec::new() };

/// One attribute of a start tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribute {
    /// Namespace URI, empty when the attribute is not namespaced.
    pub uri: String,
    /// Local part of the name.
    pub local_name: String,
    /// Qualified name as written (`prefix:local` or `local`).
    pub qname: String,
    /// Declared type, `CDATA` unless a DTD says otherwise.
    pub attr_type: String,
    /// Attribute value (unescaped).
    pub value: String,
}

impl Attribute {
    /// Sort key: local name, or the URI when the local name is empty.
    fn sort_key(&self) -> &str {
        if self.local_name.is_empty() { &self.uri } else { &self.local_name }
    }
}

/// Immutable, ordered attribute view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<Attribute>,
}

impl Attributes {
    /// Creates an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared empty view, for start tags without attributes.
    pub fn empty() -> &'static Attributes {
        &EMPTY
    }

    /// Builds a view of unqualified attributes from `(name, value)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut attrs = Self::new();
        for (name, value) in pairs {
            attrs.add("", name, name, value)?;
        }
        Ok(attrs)
    }

    /// Appends an attribute of type `CDATA`.
    ///
    /// Fails with [`Error::DuplicateAttribute`] if either key is already present.
    pub fn add(&mut self, uri: &str, local_name: &str, qname: &str, value: &str) -> Result<()> {
        self.add_typed(uri, local_name, qname, CDATA, value)
    }

    /// Appends an attribute with an explicit type.
    pub fn add_typed(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attr_type: &str,
        value: &str,
    ) -> Result<()> {
        if self.index_of(qname).is_some()
            || (!local_name.is_empty() && self.index_of_ns(uri, local_name).is_some())
        {
            return Err(Error::DuplicateAttribute(qname.to_string()));
        }
        self.entries.push(Attribute {
            uri: uri.to_string(),
            local_name: local_name.to_string(),
            qname: qname.to_string(),
            attr_type: attr_type.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the view holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the attributes in document order.
    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.entries.iter()
    }

    /// Attribute at `index`.
    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.entries.get(index)
    }

    /// Namespace URI at `index`.
    pub fn uri(&self, index: usize) -> Option<&str> {
        self.get(index).map(|a| a.uri.as_str())
    }

    /// Local name at `index`.
    pub fn local_name(&self, index: usize) -> Option<&str> {
        self.get(index).map(|a| a.local_name.as_str())
    }

    /// Qualified name at `index`.
    pub fn qname(&self, index: usize) -> Option<&str> {
        self.get(index).map(|a| a.qname.as_str())
    }

    /// Attribute type at `index`.
    pub fn attr_type(&self, index: usize) -> Option<&str> {
        self.get(index).map(|a| a.attr_type.as_str())
    }

    /// Value at `index`.
    pub fn value(&self, index: usize) -> Option<&str> {
        self.get(index).map(|a| a.value.as_str())
    }

    /// Position of the attribute with qualified name `qname`.
    pub fn index_of(&self, qname: &str) -> Option<usize> {
        self.entries.iter().position(|a| a.qname == qname)
    }

    /// Position of the attribute with namespace `uri` and `local_name`.
    pub fn index_of_ns(&self, uri: &str, local_name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|a| a.uri == uri && a.local_name == local_name)
    }

    /// Value of the attribute with qualified name `qname`.
    pub fn value_of(&self, qname: &str) -> Option<&str> {
        self.index_of(qname).and_then(|i| self.value(i))
    }

    /// Value of the attribute with namespace `uri` and `local_name`.
    pub fn value_of_ns(&self, uri: &str, local_name: &str) -> Option<&str> {
        self.index_of_ns(uri, local_name).and_then(|i| self.value(i))
    }

    /// Derives a new view from `source`.
    ///
    /// `keep` decides per index whether an attribute survives, `sort` applies a
    /// stable sort by local name (URI for empty local names) and `transform`
    /// computes each surviving value.
    pub fn derive<'a>(
        source: &'a Attributes,
        mut keep: impl FnMut(usize, &Attribute) -> bool,
        sort: bool,
        mut transform: impl FnMut(&'a Attribute) -> Cow<'a, str>,
    ) -> Attributes {
        let entries = Self::select(source, &mut keep, sort)
            .into_iter()
            .map(|attr| Attribute { value: transform(attr).into_owned(), ..attr.clone() })
            .collect();
        Attributes { entries }
    }

    /// Like [`Attributes::derive`], with a fallible value transform.
    pub fn try_derive<'a>(
        source: &'a Attributes,
        mut keep: impl FnMut(usize, &Attribute) -> bool,
        sort: bool,
        mut transform: impl FnMut(&'a Attribute) -> Result<Cow<'a, str>>,
    ) -> Result<Attributes> {
        let selected = Self::select(source, &mut keep, sort);
        let mut entries = Vec::with_capacity(selected.len());
        for attr in selected {
            let value = transform(attr)?.into_owned();
            entries.push(Attribute { value, ..attr.clone() });
        }
        Ok(Attributes { entries })
    }

    fn select<'a>(
        source: &'a Attributes,
        keep: &mut impl FnMut(usize, &Attribute) -> bool,
        sort: bool,
    ) -> Vec<&'a Attribute> {
        let mut selected: Vec<&'a Attribute> = source
            .entries
            .iter()
            .enumerate()
            .filter(|(i, a)| keep(*i, a))
            .map(|(_, a)| a)
            .collect();
        if sort {
            // Vec::sort_by ist stabil.
            selected.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
        }
        selected
    }

    /// Copy without the attributes for which `keep` returns false.
    pub fn filtered(&self, keep: impl FnMut(usize, &Attribute) -> bool) -> Attributes {
        Self::derive(self, keep, false, |a| Cow::Borrowed(&a.value))
    }

    /// Copy sorted stably by local name.
    pub fn sorted(&self) -> Attributes {
        Self::derive(self, |_, _| true, true, |a| Cow::Borrowed(&a.value))
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Attribute view whose values can be replaced in place.
///
/// Order and keys never change; there is no way to insert through this type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutableAttributes(Attributes);

impl MutableAttributes {
    /// Replaces the value of the attribute with qualified name `qname`.
    ///
    /// Fails with [`Error::AttributeNotFound`] if there is no such attribute.
    pub fn set_value(&mut self, qname: &str, value: impl Into<String>) -> Result<()> {
        let index = self
            .0
            .index_of(qname)
            .ok_or_else(|| Error::AttributeNotFound(qname.to_string()))?;
        self.0.entries[index].value = value.into();
        Ok(())
    }

    /// Replaces the value of the attribute `{uri}local_name`.
    pub fn set_value_ns(&mut self, uri: &str, local_name: &str, value: impl Into<String>) -> Result<()> {
        let index = self
            .0
            .index_of_ns(uri, local_name)
            .ok_or_else(|| Error::AttributeNotFound(format!("{{{uri}}}{local_name}")))?;
        self.0.entries[index].value = value.into();
        Ok(())
    }

    /// Gives the immutable view back.
    pub fn into_attributes(self) -> Attributes {
        self.0
    }
}

impl From<Attributes> for MutableAttributes {
    fn from(attrs: Attributes) -> Self {
        Self(attrs)
    }
}

impl Deref for MutableAttributes {
    type Target = Attributes;

    fn deref(&self) -> &Attributes {
        &self.0
    }
}
