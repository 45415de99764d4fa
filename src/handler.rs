//! The stage contract: every pipeline stage is a [`ContentHandler`].
//!
//! A stage is consumer and producer at once. All methods have a default that
//! forwards the event unchanged to [`ContentHandler::downstream`], so a
//! filter overrides only the events it changes. A terminal sink returns
//! `None` from `downstream` and every default becomes a no-op.
//!
//! Each stage has at most one successor. Sharing a sink between an owner and
//! the chain works through the `&mut H` and `Rc<RefCell<H>>` impls below.

use std::cell::RefCell;
use std::rc::Rc;

use crate::Result;
use crate::attributes::Attributes;
use crate::event::Event;

macro_rules! forward {
    ($self:ident . $method:ident ( $($arg:expr),* )) => {
        match $self.downstream() {
            Some(next) => next.$method($($arg),*),
            None => Ok(()),
        }
    };
}

/// Push-based consumer of markup events.
///
/// Events arrive well-nested: `start_document` and `end_document` bracket the
/// stream, every `start_element` has a matching `end_element`, and
/// `start_prefix_mapping` for an element arrives right before its
/// `start_element` (the matching `end_prefix_mapping` right after its
/// `end_element`). A returned error aborts the stream.
pub trait ContentHandler {
    /// The configured successor, if any.
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        None
    }

    fn start_document(&mut self) -> Result<()> {
        forward!(self.start_document())
    }

    fn end_document(&mut self) -> Result<()> {
        forward!(self.end_document())
    }

    /// Begins the scope of a prefix binding; `prefix` is empty for the default namespace.
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        forward!(self.start_prefix_mapping(prefix, uri))
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        forward!(self.end_prefix_mapping(prefix))
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        forward!(self.start_element(uri, local_name, qname, attributes))
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        forward!(self.end_element(uri, local_name, qname))
    }

    /// Character data. One text node may arrive split over several calls.
    fn characters(&mut self, text: &str) -> Result<()> {
        forward!(self.characters(text))
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        forward!(self.comment(text))
    }

    fn start_cdata(&mut self) -> Result<()> {
        forward!(self.start_cdata())
    }

    fn end_cdata(&mut self) -> Result<()> {
        forward!(self.end_cdata())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        forward!(self.processing_instruction(target, data))
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        forward!(self.start_entity(name))
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        forward!(self.end_entity(name))
    }
}

// Delegation: jede Methode explizit, damit ueberschriebene Methoden des
// Ziels greifen (die Default-Weiterleitung wuerde sie umgehen).
macro_rules! delegate_handler {
    ($($target:tt)+) => {
        fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
            None
        }
        fn start_document(&mut self) -> Result<()> {
            $($target)+(self).start_document()
        }
        fn end_document(&mut self) -> Result<()> {
            $($target)+(self).end_document()
        }
        fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
            $($target)+(self).start_prefix_mapping(prefix, uri)
        }
        fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
            $($target)+(self).end_prefix_mapping(prefix)
        }
        fn start_element(
            &mut self,
            uri: &str,
            local_name: &str,
            qname: &str,
            attributes: &Attributes,
        ) -> Result<()> {
            $($target)+(self).start_element(uri, local_name, qname, attributes)
        }
        fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
            $($target)+(self).end_element(uri, local_name, qname)
        }
        fn characters(&mut self, text: &str) -> Result<()> {
            $($target)+(self).characters(text)
        }
        fn comment(&mut self, text: &str) -> Result<()> {
            $($target)+(self).comment(text)
        }
        fn start_cdata(&mut self) -> Result<()> {
            $($target)+(self).start_cdata()
        }
        fn end_cdata(&mut self) -> Result<()> {
            $($target)+(self).end_cdata()
        }
        fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
            $($target)+(self).processing_instruction(target, data)
        }
        fn start_entity(&mut self, name: &str) -> Result<()> {
            $($target)+(self).start_entity(name)
        }
        fn end_entity(&mut self, name: &str) -> Result<()> {
            $($target)+(self).end_entity(name)
        }
    };
}

fn deref_mut<'a, H: ?Sized>(h: &'a mut &mut H) -> &'a mut H {
    h
}

fn unbox<H: ?Sized>(h: &mut Box<H>) -> &mut H {
    h.as_mut()
}

impl<H: ContentHandler + ?Sized> ContentHandler for &mut H {
    delegate_handler!(deref_mut);
}

impl<H: ContentHandler + ?Sized> ContentHandler for Box<H> {
    delegate_handler!(unbox);
}

/// Shared sink: the owner keeps an `Rc` clone to inspect the sink after the
/// stream, the chain holds the other. Re-entrant borrows panic.
impl<H: ContentHandler> ContentHandler for Rc<RefCell<H>> {
    delegate_handler!(RefCell::borrow_mut);
}

/// Terminal sink that records owned copies of all events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecorder {
    events: Vec<Event>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events in arrival order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Forgets all recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn record(&mut self, event: Event) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

impl ContentHandler for EventRecorder {
    fn start_document(&mut self) -> Result<()> {
        self.record(Event::StartDocument)
    }

    fn end_document(&mut self) -> Result<()> {
        self.record(Event::EndDocument)
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.record(Event::StartPrefixMapping { prefix: prefix.into(), uri: uri.into() })
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.record(Event::EndPrefixMapping { prefix: prefix.into() })
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.record(Event::start_element(uri, local_name, qname, attributes.clone()))
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        self.record(Event::end_element(uri, local_name, qname))
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.record(Event::Characters(text.into()))
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.record(Event::Comment(text.into()))
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.record(Event::StartCdata)
    }

    fn end_cdata(&mut self) -> Result<()> {
        self.record(Event::EndCdata)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.record(Event::ProcessingInstruction { target: target.into(), data: data.into() })
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        self.record(Event::StartEntity(name.into()))
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        self.record(Event::EndEntity(name.into()))
    }
}

/// Identity stage: forwards every event unchanged.
#[derive(Debug, Default)]
pub struct PassThrough<H> {
    inner: H,
}

impl<H: ContentHandler> PassThrough<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &H {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut H {
        &mut self.inner
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: ContentHandler> ContentHandler for PassThrough<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }
}
