//! Write-backpressure suite — scenario S5 (drain on LL write-ready) and
//! scenario S6 (closing while bytes are still queued behind the LL).
use crate::case::{TckCase, TckSuite};
use crate::support::{DrainingFilter, LoopbackLl, RecordingHandlers};
use spark_endpoint::{Endpoint, EndpointConfig, State, StdTimer, ThreadRunner};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::Duration;

const CASES: &[TckCase] = &[
    TckCase {
        name: "write_ready_drains_queued_bytes_then_fires_write_callback_once",
        test: write_ready_drains_queued_bytes_then_fires_write_callback_once,
    },
    TckCase {
        name: "close_while_draining_waits_for_final_drain_before_tearing_down",
        test: close_while_draining_waits_for_final_drain_before_tearing_down,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "backpressure",
    cases: CASES,
};

pub const fn suite() -> &'static TckSuite {
    &SUITE
}

fn open_draining_endpoint(
    chunk_cap: usize,
    handlers: std::sync::Arc<RecordingHandlers>,
) -> (Endpoint, std::sync::Arc<LoopbackLl>) {
    let ll = LoopbackLl::immediate().with_write_chunk_cap(chunk_cap);
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
        .expect("a passthrough-style open cannot fail");
    (endpoint, ll)
}

/// S5: a 10KB write only fits 4KB through the LL's capped `write`; the rest
/// stays queued in the filter. A subsequent LL write-ready event drains the
/// remainder and `write_callback` fires exactly once once nothing is left
/// pending and `xmit_enabled` is set.
fn write_ready_drains_queued_bytes_then_fires_write_callback_once() {
    let handlers = RecordingHandlers::new();
    let (endpoint, ll) = open_draining_endpoint(4096, handlers.clone());

    let payload = vec![0xABu8; 10 * 1024];
    let written = endpoint
        .write(&payload)
        .expect("write must be accepted into the filter's internal buffer");
    assert_eq!(written, payload.len(), "the filter buffers the whole payload regardless of LL capacity");
    assert_eq!(ll.total_bytes_written(), 4096, "only one capped chunk should have reached the LL so far");

    endpoint.set_write_callback_enable(true);
    // Draining a 10KB buffer 4KB at a time takes two more LL write-ready
    // events beyond the implicit one folded into `write` itself.
    endpoint.on_ll_write_ready();
    endpoint.on_ll_write_ready();

    assert_eq!(ll.total_bytes_written(), payload.len());
    assert_eq!(
        handlers.write_ready_count.load(Ordering::SeqCst),
        1,
        "write_callback must fire exactly once, only once draining is fully caught up"
    );
}

/// S6: a `close` issued while bytes are still stuck behind the LL must wait
/// in `CloseWaitDrain` until the final LL write-ready event empties the
/// filter's buffer, only then proceeding through `ClosingFilter` →
/// `ClosingLl` → `Closed`.
fn close_while_draining_waits_for_final_drain_before_tearing_down() {
    let handlers = RecordingHandlers::new();
    let (endpoint, ll) = open_draining_endpoint(256, handlers);

    let written = endpoint
        .write(&[0x42u8; 1024])
        .expect("write must be accepted into the filter's internal buffer");
    assert_eq!(written, 1024);
    assert!(ll.total_bytes_written() < 1024, "only the first capped chunk should have reached the LL");

    let (close_tx, close_rx) = mpsc::channel();
    endpoint
        .close(Box::new(move || {
            let _ = close_tx.send(());
        }))
        .expect("close from Open must be accepted even with bytes still draining");
    assert_eq!(
        endpoint.current_state(),
        State::CloseWaitDrain,
        "close must wait for the filter's pending bytes to drain before tearing down"
    );

    // Keep draining until every queued byte has reached the LL, at which
    // point the pending write-ready event advances the state machine the
    // rest of the way on its own.
    while ll.total_bytes_written() < 1024 {
        endpoint.on_ll_write_ready();
    }

    close_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("close_done must fire once the drain finishes");
    assert_eq!(endpoint.current_state(), State::Closed);
    assert_eq!(ll.total_bytes_written(), 1024);
}
