//! Error-handling suite — scenario S4 (LL read error mid-open) and the
//! write-error idempotence rule (§7: a saved send error surfaces exactly
//! once, then a fresh write is attempted).
use crate::case::{TckCase, TckSuite};
use crate::support::{
    DrainingFilter, LoopbackLl, RecordFramingFilter, RecordingHandlers, RetryHandshakeFilter,
};
use spark_endpoint::{
    Endpoint, EndpointConfig, EndpointError, ErrorKind, LowerLayer, State, StdTimer, ThreadRunner,
};
use std::sync::mpsc;
use std::time::Duration;

const CASES: &[TckCase] = &[
    TckCase {
        name: "ll_read_error_mid_open_aborts_to_closed",
        test: ll_read_error_mid_open_aborts_to_closed,
    },
    TckCase {
        name: "saved_write_error_surfaces_once_then_allows_fresh_write",
        test: saved_write_error_surfaces_once_then_allows_fresh_write,
    },
    TckCase {
        name: "unconsumed_filter_bytes_survive_to_next_readable_event",
        test: unconsumed_filter_bytes_survive_to_next_readable_event,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "errors",
    cases: CASES,
};

pub const fn suite() -> &'static TckSuite {
    &SUITE
}

/// S4: while the filter handshake is still retrying (state `OpeningFilter`),
/// the LL delivers a read error. The open attempt must abort through
/// `ClosingLl`, invoke the LL's `close`, fire `open_done` with a
/// communication error, and land in `Closed`.
fn ll_read_error_mid_open_aborts_to_closed() {
    let ll = LoopbackLl::immediate();
    let handlers = RecordingHandlers::new();
    // Two retries at 200ms keep the handshake in OpeningFilter long enough
    // for the injected read error below to land well before it would
    // otherwise resolve.
    let filter = RetryHandshakeFilter::new(2, Duration::from_millis(200));
    let endpoint = Endpoint::connect(
        ll.clone(),
        Some(Box::new(filter)),
        handlers,
        StdTimer::new(),
        ThreadRunner::new(),
        EndpointConfig::default(),
    );

    let (open_tx, open_rx) = mpsc::channel();
    endpoint
        .open(Box::new(move |result| {
            let _ = open_tx.send(result);
        }))
        .expect("open from Closed must be accepted");
    assert_eq!(endpoint.current_state(), State::OpeningFilter);

    ll.inject_read_error(EndpointError::communication("peer reset the connection"));
    endpoint.on_ll_readable();

    let result = open_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("open_done must fire even when the open attempt aborts");
    let err = result.expect_err("an aborted open must surface an error");
    assert_eq!(err.kind(), ErrorKind::Communication);
    assert_eq!(endpoint.current_state(), State::Closed);
}

/// A drain failure during a background write-ready event must be saved and
/// surfaced to exactly the next caller of `write`, after which a further
/// `write` attempts fresh I/O rather than replaying the stale error.
fn saved_write_error_surfaces_once_then_allows_fresh_write() {
    let ll = LoopbackLl::immediate().with_write_chunk_cap(4);
    let handlers = RecordingHandlers::new();
    let endpoint = Endpoint::connect(
        ll.clone(),
        Some(Box::new(DrainingFilter::new())),
        handlers,
        StdTimer::new(),
        ThreadRunner::new(),
        EndpointConfig::default(),
    );

    let (open_tx, open_rx) = mpsc::channel();
    endpoint
        .open(Box::new(move |result| {
            let _ = open_tx.send(result);
        }))
        .expect("open from Closed must be accepted");
    open_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("open_done must fire")
        .expect("no-filter-failure open cannot fail");

    // 10 bytes queue behind a 4-byte-per-call LL cap, so the filter still has
    // 6 bytes pending after the first write returns.
    let written = endpoint
        .write(b"0123456789")
        .expect("first write must be accepted into the filter's buffer");
    assert_eq!(written, 10);

    ll.inject_write_error(EndpointError::communication("send buffer reset"));
    endpoint.on_ll_write_ready();

    let first_retry = endpoint.write(b"next");
    assert_eq!(
        first_retry.expect_err("the saved drain error must surface on the next write").kind(),
        ErrorKind::Communication
    );

    let second_retry = endpoint
        .write(b"next")
        .expect("the error must not be replayed a second time");
    assert_eq!(second_retry, 4);
}

/// A filter that only decodes complete fixed-size records must not lose the
/// trailing partial record it deliberately left unconsumed: the bytes must
/// resurface, and still in order, once more raw bytes complete the record on
/// a later readable event.
fn unconsumed_filter_bytes_survive_to_next_readable_event() {
    let ll = LoopbackLl::immediate();
    let handlers = RecordingHandlers::new();
    let endpoint = Endpoint::connect(
        ll.clone(),
        Some(Box::new(RecordFramingFilter::new(4))),
        handlers.clone(),
        StdTimer::new(),
        ThreadRunner::new(),
        EndpointConfig::default(),
    );

    let (open_tx, open_rx) = mpsc::channel();
    endpoint
        .open(Box::new(move |result| {
            let _ = open_tx.send(result);
        }))
        .expect("open from Closed must be accepted");
    open_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("open_done must fire")
        .expect("no-filter-failure open cannot fail");
    endpoint.set_read_callback_enable(true);

    // 10 raw bytes: two complete 4-byte records plus a 2-byte remainder that
    // the filter cannot decode yet.
    ll.write(b"0123456789").expect("seed bytes directly on the LL loopback queue");
    endpoint.on_ll_readable();
    assert_eq!(handlers.delivered.lock().as_slice(), b"01234567");

    // Two more raw bytes complete the trailing record; the endpoint must
    // prepend the 2 bytes it stashed rather than dropping them.
    ll.write(b"ab").expect("seed the record-completing bytes");
    endpoint.on_ll_readable();
    assert_eq!(handlers.delivered.lock().as_slice(), b"0123456789ab");
}
