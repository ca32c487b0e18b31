//! Open/close lifecycle suite — scenarios S1 (synchronous open/write/close)
//! and S2 (closing while an asynchronous open is still in flight).
use crate::case::{TckCase, TckSuite};
use crate::support::{Completion, LoopbackLl, PassthroughFilter, RecordingHandlers};
use spark_endpoint::{Endpoint, EndpointConfig, State, StdTimer, ThreadRunner};
use std::sync::mpsc;
use std::time::Duration;

const CASES: &[TckCase] = &[
    TckCase {
        name: "synchronous_open_write_close_round_trip",
        test: synchronous_open_write_close_round_trip,
    },
    TckCase {
        name: "close_during_asynchronous_open_skips_open_done",
        test: close_during_asynchronous_open_skips_open_done,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "open_close",
    cases: CASES,
};

pub const fn suite() -> &'static TckSuite {
    &SUITE
}

/// S1: an immediate-completing LL and a passthrough filter open, carry one
/// write round-trip, and close — all without ever touching the deferred
/// paths.
fn synchronous_open_write_close_round_trip() {
    let ll = LoopbackLl::immediate();
    let handlers = RecordingHandlers::new();
    let endpoint = Endpoint::connect(
        ll.clone(),
        Some(Box::new(PassthroughFilter)),
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
        .expect("synchronous open over an immediate LL cannot fail");
    assert_eq!(endpoint.current_state(), State::Open);

    let written = endpoint.write(b"HELLO").expect("write while Open must succeed");
    assert_eq!(written, 5);
    assert_eq!(ll.drain_pending(), b"HELLO");

    let (close_tx, close_rx) = mpsc::channel();
    endpoint
        .close(Box::new(move || {
            let _ = close_tx.send(());
        }))
        .expect("close from Open must be accepted");
    close_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("close_done must fire");
    assert_eq!(endpoint.current_state(), State::Closed);
}

/// S2: the LL takes the `InProgress` path on `open`. A `close` issued before
/// the LL's completion callback fires must win the race — `open_done` is
/// never invoked, `close_done` fires exactly once, and the endpoint ends in
/// `Closed`.
fn close_during_asynchronous_open_skips_open_done() {
    let ll = LoopbackLl::new(Completion::Deferred, Completion::Immediate);
    let handlers = RecordingHandlers::new();
    let endpoint = Endpoint::connect(
        ll,
        None,
        handlers,
        StdTimer::new(),
        ThreadRunner::new(),
        EndpointConfig::default(),
    );

    let open_fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let open_fired_for_closure = open_fired.clone();
    endpoint
        .open(Box::new(move |_result| {
            open_fired_for_closure.store(true, std::sync::atomic::Ordering::SeqCst);
        }))
        .expect("open from Closed must be accepted");
    assert_eq!(endpoint.current_state(), State::OpeningLl);

    let (close_tx, close_rx) = mpsc::channel();
    endpoint
        .close(Box::new(move || {
            let _ = close_tx.send(());
        }))
        .expect("close from OpeningLl must be accepted");
    close_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("close_done must fire");

    assert_eq!(endpoint.current_state(), State::Closed);
    assert!(
        !open_fired.load(std::sync::atomic::Ordering::SeqCst),
        "open_done must not fire once close wins the race"
    );
}
