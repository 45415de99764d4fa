//! Integrationstests: Kette ueber zwei Threads mit Fehler-Relay.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use saxpipe::handler::ContentHandler;
use saxpipe::relay::{
    ExceptionInsertingFilter, ExceptionSlot, NoLifeCycle, ThreadConnectingFilter, ThreadLifeCycle, drain_events,
    drain_events_timeout, event_channel,
};
use saxpipe::xml::parse_str;
use saxpipe::xml_writer::XmlWriter;
use saxpipe::{Error, Result};

/// Protokolliert alle Lifecycle-Aufrufe; `thread_ended` schlaegt optional fehl.
#[derive(Clone, Default)]
struct RecordingLifeCycle {
    calls: Arc<Mutex<Vec<String>>>,
    fail_on_end: bool,
}

impl RecordingLifeCycle {
    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ThreadLifeCycle for RecordingLifeCycle {
    type Token = String;

    fn announce_child_start(&self, owner: &str, correlation_id: Option<&str>) -> String {
        self.log(format!("announce {owner}"));
        format!("{owner}/{}", correlation_id.unwrap_or("-"))
    }

    fn thread_started(&self, token: &String) -> Result<()> {
        self.log(format!("started {token}"));
        Ok(())
    }

    fn thread_ended(&self, token: &String) -> Result<()> {
        self.log(format!("ended {token}"));
        if self.fail_on_end { Err(Error::abort("commit failed")) } else { Ok(()) }
    }

    fn thread_aborted(&self, token: &String, error: Error) -> Error {
        self.log(format!("aborted {token}"));
        error
    }
}

/// Schlaegt beim ersten Kommentar fehl.
struct FailOnComment;

impl ContentHandler for FailOnComment {
    fn comment(&mut self, text: &str) -> Result<()> {
        Err(Error::stream(format!("rejected comment '{text}'")))
    }
}

const DOC: &str = "<r><a k=\"v\">text</a><!--c--><b/><c>more</c><d/></r>";

#[test]
fn events_cross_threads_unchanged() {
    let lifecycle = RecordingLifeCycle::default();
    let slot = ExceptionSlot::new();
    let (sender, receiver) = event_channel(4);
    let mut consumer =
        ThreadConnectingFilter::new(lifecycle.clone(), "job", Some("42"), slot.clone(), XmlWriter::new(Vec::new()));
    let handle = thread::spawn(move || {
        drain_events(&receiver, &mut consumer)?;
        consumer.into_inner().into_string()
    });

    let mut head = ExceptionInsertingFilter::new(sender, slot.clone());
    parse_str(DOC, &mut head).unwrap();
    drop(head);

    assert_eq!(handle.join().unwrap().unwrap(), DOC);
    assert!(!slot.is_set());
    assert_eq!(lifecycle.calls(), ["announce job", "started job/42", "ended job/42"]);
}

/// Fehler im Consumer-Lifecycle am Dokumentende erreicht den Producer.
#[test]
fn lifecycle_failure_surfaces_on_producer() {
    let lifecycle = RecordingLifeCycle { fail_on_end: true, ..Default::default() };
    let slot = ExceptionSlot::new();
    let (sender, receiver) = event_channel(0);
    let mut consumer =
        ThreadConnectingFilter::new(lifecycle.clone(), "job", None, slot.clone(), XmlWriter::new(Vec::new()));
    let handle = thread::spawn(move || drain_events(&receiver, &mut consumer));

    let mut head = ExceptionInsertingFilter::new(sender, slot.clone());
    let produced = parse_str(DOC, &mut head);

    let consumer_err = handle.join().unwrap().unwrap_err();
    assert!(consumer_err.is_abort());

    // Schon beim Dokumentende oder spaetestens beim naechsten Aufruf.
    let err = match produced {
        Err(err) => err,
        Ok(()) => head.end_document().unwrap_err(),
    };
    assert!(err.is_abort(), "{err}");
    assert_eq!(err.to_string(), consumer_err.to_string());
    assert!(!slot.is_set());
    assert_eq!(lifecycle.calls(), ["announce job", "started job/-", "ended job/-", "aborted job/-"]);
}

/// Ein Downstream-Fehler mitten im Strom bricht den Producer ab.
#[test]
fn downstream_failure_stops_producer() {
    let slot = ExceptionSlot::new();
    let (sender, receiver) = event_channel(0);
    let mut consumer = ThreadConnectingFilter::new(NoLifeCycle, "job", None, slot.clone(), FailOnComment);
    let handle = thread::spawn(move || drain_events(&receiver, &mut consumer));

    let mut head = ExceptionInsertingFilter::new(sender, slot.clone());
    let err = parse_str(DOC, &mut head).unwrap_err();
    assert!(err.to_string().contains("rejected comment 'c'"), "{err}");
    assert!(handle.join().unwrap().is_err());
    assert!(!slot.is_set());
}

/// Ohne Events innerhalb der Frist meldet der Consumer einen Timeout.
#[test]
fn consumer_times_out() {
    let (mut sender, receiver) = event_channel(1);
    sender.start_document().unwrap();
    let mut recorder = saxpipe::EventRecorder::new();
    let err = drain_events_timeout(&receiver, Duration::from_millis(20), &mut recorder).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(recorder.events().len(), 1);
    drop(sender);
}
