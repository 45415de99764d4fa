//! saxpipe – streaming XML event pipeline
//!
//! Markup is processed as a stream of events pushed through a chain of
//! stages. Every stage implements [`ContentHandler`]; a filter changes,
//! drops or inserts events and forwards the rest to its successor, the
//! [`XmlWriter`] at the tail turns them back into text.
//!
//! # Beispiel
//!
//! ```
//! use saxpipe::filter::{EmptyElementFilter, EmptyElementPolicy, PrettyPrintFilter};
//! use saxpipe::xml::parse_str;
//! use saxpipe::xml_writer::XmlWriter;
//!
//! let writer = XmlWriter::new(Vec::new());
//! let pretty = PrettyPrintFilter::new(writer);
//! let mut chain = EmptyElementFilter::new(EmptyElementPolicy::Buffered, pretty);
//!
//! parse_str("<a><b><c/></b><d>x</d></a>", &mut chain).unwrap();
//!
//! let xml = chain.into_inner().into_inner().into_string().unwrap();
//! assert_eq!(xml, "<a>\n\t<d>x</d>\n</a>");
//! ```

/// `get_ref`/`get_mut`/`into_inner` fuer Stages mit Feld `inner`.
macro_rules! inner_access {
    ($stage:ident < $($param:ident),+ >) => {
        impl<$($param),+> $stage<$($param),+> {
            /// Downstream sink.
            pub fn get_ref(&self) -> &H {
                &self.inner
            }

            /// Downstream sink, mutable.
            pub fn get_mut(&mut self) -> &mut H {
                &mut self.inner
            }

            /// Consumes the stage and returns the downstream sink.
            pub fn into_inner(self) -> H {
                self.inner
            }
        }
    };
}

pub mod attributes;
pub mod builder;
pub mod debug;
pub mod error;
pub mod event;
pub mod filter;
pub mod handler;
pub mod namespace;
pub mod options;
pub mod pipeline;
pub mod relay;
pub mod xml;
pub mod xml_writer;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent, nur für interne Datenstrukturen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

// Public API: Stage contract
pub use attributes::{Attribute, Attributes, MutableAttributes};
pub use event::Event;
pub use handler::{ContentHandler, EventRecorder, PassThrough};

// Public API: Builder
pub use builder::{DocumentBuilder, ElementBuilder};

// Public API: Options/Pipeline
pub use options::PipelineOptions;
pub use pipeline::{build, build_to_writer, run_reader, run_str};

// Public API: Relay
pub use relay::{
    ExceptionInsertingFilter, ExceptionSlot, NoLifeCycle, ThreadConnectingFilter, ThreadLifeCycle,
    drain_events, event_channel,
};

// Public API: XML
pub use xml::{parse_fragment, parse_reader, parse_str, parse_str_to_events};
pub use xml_writer::{WriterOptions, XmlWriter, events_to_pretty_xml, events_to_xml};
