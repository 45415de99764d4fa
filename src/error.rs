//! Central error types for the event pipeline.
//!
//! Three kinds matter to callers: [`Error::Stream`] (generic failure while
//! processing events, optionally wrapping a cause and a source location),
//! [`Error::Parse`] (a located parse failure whose position is kept as
//! structured fields) and [`Error::Timeout`] (an upstream wait exceeded its
//! deadline; terminal, never retried inside the pipeline). The remaining
//! variants are invariant violations raised by individual stages.

use core::fmt;
use std::borrow::Cow;
use std::sync::Arc;

/// Shared, thread-safe error cause.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Position in the markup source an event originated from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Public identifier of the source, if known.
    pub public_id: Option<String>,
    /// System identifier (usually a file name or URL), if known.
    pub system_id: Option<String>,
    /// 1-based line number.
    pub line: Option<u64>,
    /// 1-based column number.
    pub column: Option<u64>,
}

impl Location {
    /// Erstellt eine Location aus Zeile und Spalte.
    pub fn at(line: u64, column: u64) -> Self {
        Self { line: Some(line), column: Some(column), ..Self::default() }
    }

    /// Setzt den System-Identifier.
    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    /// Setzt den Public-Identifier.
    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }

    /// Berechnet Zeile/Spalte fuer einen Byte-Offset in `source`.
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source.as_bytes()[..offset];
        let line = memchr::memchr_iter(b'\n', before).count() as u64 + 1;
        let line_start = memchr::memrchr(b'\n', before).map_or(0, |p| p + 1);
        let column = source[line_start..]
            .char_indices()
            .take_while(|(i, _)| line_start + i < offset)
            .count() as u64
            + 1;
        Self::at(line, column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(4);
        if let Some(public_id) = &self.public_id {
            parts.push(format!("publicId [{public_id}]"));
        }
        if let Some(system_id) = &self.system_id {
            parts.push(format!("systemId [{system_id}]"));
        }
        if let Some(line) = self.line {
            parts.push(format!("line [{line}]"));
        }
        if let Some(column) = self.column {
            parts.push(format!("column [{column}]"));
        }
        f.write_str(&parts.join(" "))
    }
}

/// All failures a pipeline stage can signal.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Generic failure during event processing.
    Stream {
        message: Cow<'static, str>,
        location: Option<Location>,
        cause: Option<Cause>,
    },
    /// Parse failure that keeps the source position as separate fields.
    Parse {
        message: Cow<'static, str>,
        location: Location,
    },
    /// An upstream wait exceeded its deadline.
    ///
    /// Terminal: stages never retry after a timeout.
    Timeout {
        message: Cow<'static, str>,
        cause: Option<Cause>,
    },
    /// A consumer requested that the stream stops early.
    Abort(Cow<'static, str>),
    /// Writing serialized output failed.
    Io(String),
    /// `EndPrefixMapping` for a prefix without an active binding.
    NamespaceUnderflow(String),
    /// Attribute mutation on a builder frame whose start tag was already emitted.
    FrameClosed(String),
    /// `set_value` on a mutable attribute view for a missing key.
    AttributeNotFound(String),
    /// Attempt to add an attribute whose key is already present.
    DuplicateAttribute(String),
    /// `EndElement` without a matching open element.
    UnbalancedEndElement(String),
    /// A placeholder value refers back to itself.
    CircularReference(String),
    /// Contradictory or incomplete pipeline options.
    InvalidOptions(Cow<'static, str>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream { message, location, cause } => {
                write!(f, "{message}")?;
                if let Some(location) = location {
                    write!(f, " ({location})")?;
                }
                if let Some(cause) = cause {
                    write!(f, ": {cause}")?;
                }
                Ok(())
            }
            Self::Parse { message, location } => write!(f, "parse error: {message} ({location})"),
            Self::Timeout { message, cause } => match cause {
                Some(cause) => write!(f, "timeout: {message}: {cause}"),
                None => write!(f, "timeout: {message}"),
            },
            Self::Abort(msg) => write!(f, "stream aborted: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::NamespaceUnderflow(prefix) => {
                write!(f, "no namespace binding to end for prefix '{prefix}'")
            }
            Self::FrameClosed(name) => write!(
                f,
                "cannot add attribute to element '{name}': start tag already emitted"
            ),
            Self::AttributeNotFound(key) => write!(f, "attribute '{key}' not found"),
            Self::DuplicateAttribute(key) => write!(f, "duplicate attribute '{key}'"),
            Self::UnbalancedEndElement(name) => {
                write!(f, "end element '{name}' without matching start element")
            }
            Self::CircularReference(key) => {
                write!(f, "circular reference to property '{key}'")
            }
            Self::InvalidOptions(msg) => write!(f, "invalid pipeline options: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stream { cause: Some(cause), .. } | Self::Timeout { cause: Some(cause), .. } => {
                Some(cause.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl Error {
    /// Erstellt einen `Stream` Fehler mit Nachricht.
    pub fn stream(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Stream { message: message.into(), location: None, cause: None }
    }

    /// Erstellt einen `Stream` Fehler, der eine Ursache umhuellt.
    pub fn wrap(
        message: impl Into<Cow<'static, str>>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let cause: Cause = Arc::new(cause);
        Self::Stream { message: message.into(), location: None, cause: Some(cause) }
    }

    /// Erstellt einen `Parse` Fehler an einer Position.
    pub fn parse(message: impl Into<Cow<'static, str>>, location: Location) -> Self {
        Self::Parse { message: message.into(), location }
    }

    /// Erstellt einen `Timeout` Fehler.
    pub fn timeout(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Timeout { message: message.into(), cause: None }
    }

    /// Erstellt einen `Abort` Fehler.
    pub fn abort(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Abort(message.into())
    }

    /// Attaches a source location to a `Stream` error.
    ///
    /// Other kinds are returned unchanged; a `Parse` error already owns its position.
    pub fn with_location(self, location: Location) -> Self {
        match self {
            Self::Stream { message, cause, .. } => {
                Self::Stream { message, location: Some(location), cause }
            }
            other => other,
        }
    }

    /// Source position, when the error carries one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Stream { location, .. } => location.as_ref(),
            Self::Parse { location, .. } => Some(location),
            _ => None,
        }
    }

    /// True for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for [`Error::Abort`].
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Self::wrap("XML parse error", e)
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_display() {
        let e = Error::stream("boom");
        assert_eq!(e.to_string(), "boom");
        assert!(e.location().is_none());
    }

    #[test]
    fn stream_with_location_display() {
        let loc = Location::at(3, 7).with_system_id("in.xml");
        let e = Error::stream("unexpected end").with_location(loc.clone());
        let msg = e.to_string();
        assert!(msg.contains("unexpected end"), "{msg}");
        assert!(msg.contains("systemId [in.xml]"), "{msg}");
        assert!(msg.contains("line [3]"), "{msg}");
        assert!(msg.contains("column [7]"), "{msg}");
        assert_eq!(e.location(), Some(&loc));
    }

    #[test]
    fn parse_keeps_structured_location() {
        let e = Error::parse("bad tag", Location::at(2, 5).with_public_id("-//X//EN"));
        let loc = e.location().unwrap();
        assert_eq!(loc.line, Some(2));
        assert_eq!(loc.column, Some(5));
        assert_eq!(loc.public_id.as_deref(), Some("-//X//EN"));
        assert!(e.to_string().contains("publicId [-//X//EN]"));
    }

    #[test]
    fn parse_ignores_with_location() {
        let e = Error::parse("x", Location::at(1, 1)).with_location(Location::at(9, 9));
        assert_eq!(e.location().unwrap().line, Some(1));
    }

    #[test]
    fn wrap_exposes_source() {
        let io = std::io::Error::other("disk full");
        let e = Error::wrap("write failed", io);
        assert!(e.to_string().contains("disk full"));
        let source = std::error::Error::source(&e).unwrap();
        assert_eq!(source.to_string(), "disk full");
    }

    #[test]
    fn timeout_is_classified() {
        let e = Error::timeout("worker did not finish within 30s");
        assert!(e.is_timeout());
        assert!(!e.is_abort());
        assert!(e.to_string().starts_with("timeout"));
    }

    #[test]
    fn location_from_offset() {
        let src = "<a>\n  <b/>\n</a>";
        let loc = Location::from_offset(src, 6);
        assert_eq!(loc.line, Some(2));
        assert_eq!(loc.column, Some(3));
        assert_eq!(Location::from_offset(src, 0), Location::at(1, 1));
    }

    #[test]
    fn invariant_violations_display() {
        assert!(Error::NamespaceUnderflow("ns".into()).to_string().contains("'ns'"));
        assert!(Error::FrameClosed("row".into()).to_string().contains("already emitted"));
        assert!(Error::AttributeNotFound("id".into()).to_string().contains("'id'"));
        assert!(Error::DuplicateAttribute("id".into()).to_string().contains("duplicate"));
        assert!(Error::CircularReference("a".into()).to_string().contains("circular"));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }

    #[test]
    fn io_error_conversion() {
        let e: Error = std::io::Error::other("pipe closed").into();
        assert!(matches!(e, Error::Io(ref m) if m.contains("pipe closed")));
    }
}
