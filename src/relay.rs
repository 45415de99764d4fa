//! Cross-thread exception relay.
//!
//! When a chain is split over two threads, the producer keeps pushing events
//! into a channel while a consumer thread drives the rest of the chain. A
//! failure on the consumer side must surface on the producer side, otherwise
//! the producer never learns that its output went nowhere.
//!
//! ```text
//! producer thread                          consumer thread
//! ExceptionInsertingFilter ─▶ EventSender ═▶ drain_events ─▶ ThreadConnectingFilter ─▶ …
//!          ▲                                                          │
//!          └──────────────────── ExceptionSlot ◀──────────────────────┘
//! ```
//!
//! The consumer stage funnels every failure (its own lifecycle calls and the
//! downstream's) into the shared [`ExceptionSlot`]. The producer stage checks
//! the slot after each forwarded event and raises the stored error unchanged.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace};

use crate::attributes::Attributes;
use crate::event::Event;
use crate::handler::ContentHandler;
use crate::{Error, Result};

/// Single-slot error register shared between two threads.
///
/// The first inserted error wins; later ones are dropped until the slot is
/// taken.
#[derive(Debug, Clone, Default)]
pub struct ExceptionSlot(Arc<Mutex<Option<Error>>>);

impl ExceptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Error>> {
        // Option<Error> bleibt auch nach einem Panic konsistent.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `error` unless another one is pending. Returns true if stored.
    pub fn insert(&self, error: Error) -> bool {
        let mut slot = self.lock();
        if slot.is_some() {
            debug!("exception slot occupied, dropping: {error}");
            return false;
        }
        *slot = Some(error);
        true
    }

    /// Removes and returns the pending error.
    pub fn take(&self) -> Option<Error> {
        self.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }
}

/// Producer-side stage: forwards, then raises any error the consumer inserted.
pub struct ExceptionInsertingFilter<H> {
    inner: H,
    slot: ExceptionSlot,
}

inner_access!(ExceptionInsertingFilter<H>);

impl<H: ContentHandler> ExceptionInsertingFilter<H> {
    pub fn new(inner: H, slot: ExceptionSlot) -> Self {
        Self { inner, slot }
    }

    pub fn slot(&self) -> &ExceptionSlot {
        &self.slot
    }

    /// A relayed error takes precedence over the forward's own result: a
    /// consumer that failed usually also closed the channel.
    fn relay(&self, forwarded: Result<()>) -> Result<()> {
        if let Some(error) = self.slot.take() {
            debug!("raising error relayed from consumer thread: {error}");
            return Err(error);
        }
        forwarded
    }
}

macro_rules! relayed {
    ($($method:ident ( $($arg:ident : $ty:ty),* );)+) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) -> Result<()> {
                let forwarded = self.inner.$method($($arg),*);
                self.relay(forwarded)
            }
        )+
    };
}

impl<H: ContentHandler> ContentHandler for ExceptionInsertingFilter<H> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    relayed! {
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

/// Thread coordination collaborator (transaction resume, context hand-over).
///
/// `announce_child_start` runs on the parent thread before the child starts;
/// the other calls run on the child.
pub trait ThreadLifeCycle {
    type Token;

    fn announce_child_start(&self, owner: &str, correlation_id: Option<&str>) -> Self::Token;

    fn thread_started(&self, token: &Self::Token) -> Result<()>;

    fn thread_ended(&self, token: &Self::Token) -> Result<()>;

    /// Reports a failure on the child; returns the error to relay.
    fn thread_aborted(&self, token: &Self::Token, error: Error) -> Error;
}

/// Lifecycle without any coordination.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLifeCycle;

impl ThreadLifeCycle for NoLifeCycle {
    type Token = ();

    fn announce_child_start(&self, _owner: &str, _correlation_id: Option<&str>) {}

    fn thread_started(&self, _token: &()) -> Result<()> {
        Ok(())
    }

    fn thread_ended(&self, _token: &()) -> Result<()> {
        Ok(())
    }

    fn thread_aborted(&self, _token: &(), error: Error) -> Error {
        error
    }
}

/// Consumer-side stage: brackets the document with lifecycle calls and
/// funnels every failure into the shared slot.
pub struct ThreadConnectingFilter<H, T: ThreadLifeCycle> {
    inner: H,
    lifecycle: T,
    token: T::Token,
    slot: ExceptionSlot,
}

impl<H, T: ThreadLifeCycle> ThreadConnectingFilter<H, T> {
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

impl<H: ContentHandler, T: ThreadLifeCycle> ThreadConnectingFilter<H, T> {
    /// Announces the child thread; call on the parent thread.
    pub fn new(
        lifecycle: T,
        owner: &str,
        correlation_id: Option<&str>,
        slot: ExceptionSlot,
        inner: H,
    ) -> Self {
        trace!("announcing consumer thread for '{owner}'");
        let token = lifecycle.announce_child_start(owner, correlation_id);
        Self { inner, lifecycle, token, slot }
    }

    fn funnel(&self, result: Result<()>) -> Result<()> {
        result.map_err(|error| {
            let error = self.lifecycle.thread_aborted(&self.token, error);
            self.slot.insert(error.clone());
            error
        })
    }
}

macro_rules! funneled {
    ($($method:ident ( $($arg:ident : $ty:ty),* );)+) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) -> Result<()> {
                let result = self.inner.$method($($arg),*);
                self.funnel(result)
            }
        )+
    };
}

impl<H: ContentHandler, T: ThreadLifeCycle> ContentHandler for ThreadConnectingFilter<H, T> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    fn start_document(&mut self) -> Result<()> {
        let started = self.lifecycle.thread_started(&self.token);
        self.funnel(started)?;
        let result = self.inner.start_document();
        self.funnel(result)
    }

    fn end_document(&mut self) -> Result<()> {
        let result = self.inner.end_document();
        self.funnel(result)?;
        let ended = self.lifecycle.thread_ended(&self.token);
        self.funnel(ended)
    }

    funneled! {
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

/// Terminal stage that moves owned events into a channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: SyncSender<Event>,
}

/// Bounded event channel; `capacity` 0 makes every send a rendezvous.
pub fn event_channel(capacity: usize) -> (EventSender, Receiver<Event>) {
    let (tx, rx) = sync_channel(capacity);
    (EventSender { tx }, rx)
}

impl EventSender {
    fn send(&mut self, event: Event) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::stream("event receiver disconnected"))
    }
}

impl ContentHandler for EventSender {
    fn start_document(&mut self) -> Result<()> {
        self.send(Event::StartDocument)
    }

    fn end_document(&mut self) -> Result<()> {
        self.send(Event::EndDocument)
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.send(Event::StartPrefixMapping { prefix: prefix.into(), uri: uri.into() })
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.send(Event::EndPrefixMapping { prefix: prefix.into() })
    }

    fn start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.send(Event::start_element(uri, local_name, qname, attributes.clone()))
    }

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str) -> Result<()> {
        self.send(Event::end_element(uri, local_name, qname))
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.send(Event::Characters(text.into()))
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.send(Event::Comment(text.into()))
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.send(Event::StartCdata)
    }

    fn end_cdata(&mut self) -> Result<()> {
        self.send(Event::EndCdata)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.send(Event::ProcessingInstruction { target: target.into(), data: data.into() })
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        self.send(Event::StartEntity(name.into()))
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        self.send(Event::EndEntity(name.into()))
    }
}

/// Replays received events into `handler` until `EndDocument` or until all
/// senders are gone.
pub fn drain_events(receiver: &Receiver<Event>, handler: &mut dyn ContentHandler) -> Result<()> {
    for event in receiver.iter() {
        event.send_to(handler)?;
        if event == Event::EndDocument {
            break;
        }
    }
    Ok(())
}

/// Like [`drain_events`], failing with [`Error::Timeout`] when no event
/// arrives within `timeout`.
pub fn drain_events_timeout(
    receiver: &Receiver<Event>,
    timeout: Duration,
    handler: &mut dyn ContentHandler,
) -> Result<()> {
    loop {
        let event = match receiver.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::timeout(format!("no event within {timeout:?}")));
            }
        };
        event.send_to(handler)?;
        if event == Event::EndDocument {
            return Ok(());
        }
    }
}
