//! Debug inspection hooks.
//!
//! A pipeline owner may hand each sink to an [`XmlDebugger`] before wiring it
//! into the chain. The debugger returns the sink to use instead, usually a
//! wrapper that observes the events and forwards them unchanged.

use std::fmt::Debug;

use log::{Level, debug, log_enabled};

use crate::Result;
use crate::attributes::Attributes;
use crate::handler::ContentHandler;
use crate::xml_writer::XmlWriter;

/// Hook that may wrap a sink for inspection.
pub trait XmlDebugger {
    fn inspect_xml<'a>(&self, label: &str, sink: Box<dyn ContentHandler + 'a>) -> Box<dyn ContentHandler + 'a>;
}

/// Logs every event of the inspected stream at `debug!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDebugger;

impl XmlDebugger for LoggingDebugger {
    fn inspect_xml<'a>(&self, label: &str, sink: Box<dyn ContentHandler + 'a>) -> Box<dyn ContentHandler + 'a> {
        if !log_enabled!(Level::Debug) {
            return sink;
        }
        Box::new(EventLogger::new(label, sink))
    }
}

/// Stage that logs each event, prefixed with a label, and forwards it.
pub struct EventLogger<H> {
    label: String,
    inner: H,
    events: u64,
}

inner_access!(EventLogger<H>);

impl<H: ContentHandler> EventLogger<H> {
    pub fn new(label: impl Into<String>, inner: H) -> Self {
        Self { label: label.into(), inner, events: 0 }
    }

    /// Number of events seen so far.
    pub fn event_count(&self) -> u64 {
        self.events
    }

    fn log(&mut self, name: &str, args: &[&dyn Debug]) {
        self.events += 1;
        debug!("[{}] #{} {name} {args:?}", self.label, self.events);
    }
}

macro_rules! logged {
    ($($method:ident ( $($arg:ident : $ty:ty),* );)+) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) -> Result<()> {
                self.log(stringify!($method), &[$(&$arg),*]);
                self.inner.$method($($arg),*)
            }
        )+
    };
}

impl<H: ContentHandler> ContentHandler for EventLogger<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    logged! {
        start_document();
        end_document();
        start_prefix_mapping(prefix: &str, uri: &str);
        end_prefix_mapping(prefix: &str);
        start_element(uri: &str, local_name: &str, qname: &str, attributes: &Attributes);
        end_element(uri: &str, local_name: &str, qname: &str);
        characters(text: &str);
        comment(text: &str);
        start_cdata();
        end_cdata();
        processing_instruction(target: &str, data: &str);
        start_entity(name: &str);
        end_entity(name: &str);
    }
}

/// Forwards everything and keeps a serialized copy of the stream.
pub struct XmlTap<H> {
    inner: H,
    copy: XmlWriter<Vec<u8>>,
}

inner_access!(XmlTap<H>);

impl<H: ContentHandler> XmlTap<H> {
    pub fn new(inner: H) -> Self {
        Self { inner, copy: XmlWriter::new(Vec::new()) }
    }

    /// Markup seen so far (lossy for non-UTF-8 output).
    pub fn captured(&self) -> String {
        String::from_utf8_lossy(self.copy.get_ref()).into_owned()
    }

    /// Downstream sink and captured markup.
    pub fn into_parts(self) -> (H, String) {
        let captured = self.captured();
        (self.inner, captured)
    }
}

macro_rules! tapped {
    ($($method:ident ( $($arg:ident : $ty:ty),* );)+) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) -> Result<()> {
                self.copy.$method($($arg),*)?;
                self.inner.$method($($arg),*)
            }
        )+
    };
}

impl<H: ContentHandler> ContentHandler for XmlTap<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    tapped! {
        start_document();
        end_document();
        start_prefix_mapping(prefix: &str, uri: &str);
        end_prefix_mapping(prefix: &str);
        start_element(uri: &str, local_name: &str, qname: &str, attributes: &Attributes);
        end_element(uri: &str, local_name: &str, qname: &str);
        characters(text: &str);
        comment(text: &str);
        start_cdata();
        end_cdata();
        processing_instruction(target: &str, data: &str);
        start_entity(name: &str);
        end_entity(name: &str);
    }
}
