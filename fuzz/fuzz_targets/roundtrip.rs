#![no_main]
use libfuzzer_sys::fuzz_target;
use saxpipe::filter::{EmptyElementPolicy, PrettyPrintOptions};
use saxpipe::options::PipelineOptions;

fuzz_target!(|data: &[u8]| {
    let Ok(xml) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(events) = saxpipe::parse_str_to_events(xml) else {
        return;
    };
    // Serialisieren und erneut parsen muss denselben Event-Strom ergeben.
    let out = saxpipe::events_to_xml(&events).expect("serialize parsed events");
    let reparsed = saxpipe::parse_str_to_events(&out).expect("reparse own output");
    assert_eq!(reparsed, events);

    let opts = PipelineOptions::default()
        .with_skip_empty(EmptyElementPolicy::Buffered)
        .with_pretty(PrettyPrintOptions::default());
    let once = saxpipe::run_str(&opts, xml).expect("pipeline on well-formed input");
    let twice = saxpipe::run_str(&opts, &once).expect("pipeline on own output");
    assert_eq!(once, twice);
});
