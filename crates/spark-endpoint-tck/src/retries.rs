//! Handshake-retry suite — scenario S3: a filter's `try_connect` requests a
//! fixed number of timed retries before completing, and `open_done` fires
//! exactly once once it finally succeeds.
use crate::case::{TckCase, TckSuite};
use crate::support::{LoopbackLl, RecordingHandlers, RetryHandshakeFilter, wait_until};
use spark_endpoint::{Endpoint, EndpointConfig, State, StdTimer, ThreadRunner};
use std::sync::mpsc;
use std::time::Duration;

const CASES: &[TckCase] = &[TckCase {
    name: "handshake_retries_three_times_then_opens_exactly_once",
    test: handshake_retries_three_times_then_opens_exactly_once,
}];

const SUITE: TckSuite = TckSuite {
    name: "retries",
    cases: CASES,
};

pub const fn suite() -> &'static TckSuite {
    &SUITE
}

fn handshake_retries_three_times_then_opens_exactly_once() {
    let ll = LoopbackLl::immediate();
    let handlers = RecordingHandlers::new();
    let filter = RetryHandshakeFilter::new(3, Duration::from_millis(5));
    let endpoint = Endpoint::connect(
        ll,
        Some(Box::new(filter)),
        handlers,
        StdTimer::new(),
        ThreadRunner::new(),
        EndpointConfig::default(),
    );

    let (open_tx, open_rx) = mpsc::channel();
    let fire_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let fire_count_for_closure = fire_count.clone();
    endpoint
        .open(Box::new(move |result| {
            fire_count_for_closure.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let _ = open_tx.send(result);
        }))
        .expect("open from Closed must be accepted");

    let opened = wait_until(
        || endpoint.current_state() == State::Open,
        Duration::from_secs(2),
    );
    assert!(opened, "handshake must eventually complete after its retries");

    let result = open_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("open_done must fire after the retries are exhausted");
    result.expect("a handshake that completes with Done must not surface an error");
    assert_eq!(
        fire_count.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "open_done must fire exactly once despite three intermediate retries"
    );
}
