//! Test doubles shared by every suite: an in-memory loopback LL, a
//! passthrough filter, and a retry-handshake filter (Ambient 6.1).
//!
//! # 设计背景（Why）
//! `spark-endpoint` 核心对 LL/Filter 一无所知（§1 Non-goals），但 TCK 需要
//! 可控、确定性的双方来驱动 §8 的场景 S1–S6；这里提供的三个测试替身就是
//! "最小但足够"的那一对，集中封装可复用构造函数。
//!
//! # 逻辑解析（How）
//! `LoopbackLl` 把 `write` 直接灌回自己的内部队列而不是真正发往网络，调用方
//! （各个测试场景）扮演"reactor"的角色：在 `write`/注入错误之后显式调用
//! `Endpoint::on_ll_readable`/`on_ll_write_ready`，对应"宿主提供协作式事件
//! 源、核心不假设串行化"的模型——事件永远是由宿主显式投递的，核心从不自行
//! 轮询。
//!
//! # 契约说明（What）
//! `PassthroughFilter` 的 `ul_write`/`ll_write` 原样转发；
//! `RetryHandshakeFilter` 的 `try_connect` 前 N 次返回 `RetryAfter`，之后
//! 返回 `Done`，用于场景 S3。
use std::collections::VecDeque;
use std::fmt::Write;
use std::panic;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use spark_endpoint::error::EndpointError;
use spark_endpoint::filter::{Filter, Sink, TryStepOutcome};
use spark_endpoint::handlers::EndpointHandlers;
use spark_endpoint::ll::{LlCloseCompletion, LlOpenCompletion, LowerLayer, PeerDescriptor};

/// Re-raises a caught panic with the failing suite/case name prefixed, so a
/// `cargo test` failure points straight at the scenario instead of an
/// anonymous line inside `run_suite`.
pub fn panic_with_context(suite: &str, case: &str, payload: Box<dyn std::any::Any + Send>) -> ! {
    let mut message = String::new();
    let _ = write!(&mut message, "[spark-endpoint-tck::{suite}::{case}] failed: ");

    if let Some(text) = payload.downcast_ref::<&str>() {
        let _ = write!(&mut message, "{text}");
    } else if let Some(text) = payload.downcast_ref::<String>() {
        let _ = write!(&mut message, "{text}");
    } else {
        let _ = write!(&mut message, "<non-string panic payload>");
    }

    panic::resume_unwind(Box::new(message));
}

/// Blocks the calling thread until `poll` returns true or `timeout` elapses,
/// polling every millisecond. Scenarios drive the loopback LL from the
/// calling thread, so waiting on a condvar would deadlock; a short poll loop
/// sidesteps that without adding a second synchronization primitive.
pub fn wait_until<F: FnMut() -> bool>(mut poll: F, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    loop {
        if poll() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Configures how [`LoopbackLl::open`]/[`LoopbackLl::close`] complete, so a
/// single type can stand in for both the synchronous-open scenario (S1) and
/// the asynchronous-open scenario (S2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Immediate,
    Deferred,
}

struct LoopbackState {
    /// Bytes written by the endpoint, waiting to be "received" back — the
    /// loopback half of the pipe. A real transport would hand these to the
    /// peer; here the harness calls `read` on the same object to fetch them.
    pending: VecDeque<u8>,
    read_enabled: bool,
    write_enabled: bool,
    /// Consumed (taken) by the next `read`, modelling an injected LL error
    /// (scenario S4).
    injected_read_err: Option<EndpointError>,
    /// Consumed (taken) by the next `write`, modelling an injected LL error
    /// on the send path (write-error idempotence case).
    injected_write_err: Option<EndpointError>,
}

/// An in-memory loopback transport: whatever is `write`n becomes readable.
/// Open/close latency, a per-call write-capacity cap (scenario S5/S6's
/// "LL accepts 4KB"), and read-error injection are all test-controlled so
/// scenarios S1–S6 can drive every state transition deterministically.
pub struct LoopbackLl {
    state: Mutex<LoopbackState>,
    open_completion: Completion,
    close_completion: Completion,
    bytes_written_total: AtomicUsize,
    /// Caps how many bytes a single `write` call accepts, modelling a full
    /// socket send buffer. `None` means unlimited.
    write_chunk_cap: Option<usize>,
}

impl LoopbackLl {
    pub fn new(open_completion: Completion, close_completion: Completion) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LoopbackState {
                pending: VecDeque::new(),
                read_enabled: false,
                write_enabled: false,
                injected_read_err: None,
                injected_write_err: None,
            }),
            open_completion,
            close_completion,
            bytes_written_total: AtomicUsize::new(0),
            write_chunk_cap: None,
        })
    }

    pub fn immediate() -> Arc<Self> {
        Self::new(Completion::Immediate, Completion::Immediate)
    }

    pub fn with_write_chunk_cap(mut self: Arc<Self>, cap: usize) -> Arc<Self> {
        Arc::get_mut(&mut self)
            .expect("chunk cap must be set before sharing the Arc")
            .write_chunk_cap = Some(cap);
        self
    }

    /// True once the harness should call `Endpoint::on_ll_readable`.
    pub fn has_pending(&self) -> bool {
        !self.state.lock().pending.is_empty()
    }

    /// Drains and returns whatever the endpoint has written so far, as the
    /// peer on the other end of the loopback would observe it.
    pub fn drain_pending(&self) -> Vec<u8> {
        self.state.lock().pending.drain(..).collect()
    }

    /// Queue a one-shot read error to be returned by the next `read` call
    /// instead of draining `pending` (scenario S4).
    pub fn inject_read_error(&self, err: EndpointError) {
        self.state.lock().injected_read_err = Some(err);
    }

    /// Queue a one-shot write error to be returned by the next `write` call
    /// instead of accepting bytes (write-error idempotence case).
    pub fn inject_write_error(&self, err: EndpointError) {
        self.state.lock().injected_write_err = Some(err);
    }

    pub fn total_bytes_written(&self) -> usize {
        self.bytes_written_total.load(Ordering::SeqCst)
    }

    pub fn read_enabled(&self) -> bool {
        self.state.lock().read_enabled
    }

    pub fn write_enabled(&self) -> bool {
        self.state.lock().write_enabled
    }
}

impl PeerDescriptor for LoopbackLl {
    fn raddr_to_str(&self) -> Option<String> {
        Some("loopback".to_string())
    }
    fn remote_id(&self) -> Option<u64> {
        Some(0)
    }
}

impl LowerLayer for LoopbackLl {
    fn read(&self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        let mut state = self.state.lock();
        if let Some(err) = state.injected_read_err.take() {
            return Err(err);
        }
        let n = state.pending.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.pending.pop_front().expect("checked len above");
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, EndpointError> {
        let mut state = self.state.lock();
        if let Some(err) = state.injected_write_err.take() {
            return Err(err);
        }
        let accepted = match self.write_chunk_cap {
            Some(cap) => buf.len().min(cap),
            None => buf.len(),
        };
        state.pending.extend(buf[..accepted].iter().copied());
        drop(state);
        self.bytes_written_total.fetch_add(accepted, Ordering::SeqCst);
        Ok(accepted)
    }

    fn open(
        &self,
        on_done: Box<dyn FnOnce(Result<(), EndpointError>) + Send>,
    ) -> LlOpenCompletion {
        match self.open_completion {
            Completion::Immediate => LlOpenCompletion::Done(Ok(())),
            Completion::Deferred => {
                // Sleep first so a test calling `close` right after `open`
                // returns reliably observes the in-progress window instead
                // of racing this thread to the punch.
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(30));
                    on_done(Ok(()));
                });
                LlOpenCompletion::InProgress
            }
        }
    }

    fn close(&self, on_done: Box<dyn FnOnce() + Send>) -> LlCloseCompletion {
        match self.close_completion {
            Completion::Immediate => LlCloseCompletion::Done,
            Completion::Deferred => {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(30));
                    on_done();
                });
                LlCloseCompletion::InProgress
            }
        }
    }

    fn set_read_callback_enable(&self, enable: bool) {
        self.state.lock().read_enabled = enable;
    }

    fn set_write_callback_enable(&self, enable: bool) {
        self.state.lock().write_enabled = enable;
    }
}

/// The null filter: `ul_write`/`ll_write` hand bytes straight to the sink.
/// Used for the round-trip identity property and scenario S1.
#[derive(Default)]
pub struct PassthroughFilter;

impl Filter for PassthroughFilter {
    fn setup(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn cleanup(&self) {}
    fn ul_read_pending(&self) -> bool {
        false
    }
    fn ll_write_pending(&self) -> bool {
        false
    }
    fn ll_read_needed(&self) -> bool {
        false
    }
    fn check_open_done(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn try_connect(&self) -> TryStepOutcome {
        TryStepOutcome::Done
    }
    fn try_disconnect(&self) -> TryStepOutcome {
        TryStepOutcome::Done
    }
    fn ul_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError> {
        sink(buf)
    }
    fn ll_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError> {
        sink(buf)
    }
}

/// A filter that queues every `ul_write`d byte internally before handing it
/// to the LL sink, only releasing as much as the sink accepts. This is what
/// makes `ll_write_pending` observable while bytes are still stuck behind a
/// throttled [`LoopbackLl`] — the passthrough filter has no buffer of its
/// own, so scenario S6 ("close while draining") needs this instead.
#[derive(Default)]
pub struct DrainingFilter {
    queue: Mutex<VecDeque<u8>>,
}

impl DrainingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn drain_into(queue: &mut VecDeque<u8>, sink: &mut Sink<'_>) -> Result<(), EndpointError> {
        if queue.is_empty() {
            return Ok(());
        }
        let chunk: Vec<u8> = queue.iter().copied().collect();
        let accepted = sink(&chunk)?;
        queue.drain(..accepted);
        Ok(())
    }
}

impl Filter for DrainingFilter {
    fn setup(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn cleanup(&self) {}
    fn ul_read_pending(&self) -> bool {
        false
    }
    fn ll_write_pending(&self) -> bool {
        !self.queue.lock().is_empty()
    }
    fn ll_read_needed(&self) -> bool {
        false
    }
    fn check_open_done(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn try_connect(&self) -> TryStepOutcome {
        TryStepOutcome::Done
    }
    fn try_disconnect(&self) -> TryStepOutcome {
        TryStepOutcome::Done
    }
    fn ul_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError> {
        let mut queue = self.queue.lock();
        queue.extend(buf.iter().copied());
        Self::drain_into(&mut queue, sink)?;
        Ok(buf.len())
    }
    fn ll_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError> {
        sink(buf)
    }
}

/// A filter that only decodes complete fixed-size "records" from the raw LL
/// stream, leaving a short trailing partial record unconsumed on purpose —
/// it keeps no raw-byte buffer of its own, unlike [`DrainingFilter`] (which
/// buffers on the `ul_write`/outgoing side). Exercises the core's carry-over
/// of unconsumed `ll_write` bytes across `on_ll_readable` calls.
pub struct RecordFramingFilter {
    record_len: usize,
}

impl RecordFramingFilter {
    pub fn new(record_len: usize) -> Self {
        assert!(record_len > 0, "record_len must be positive");
        Self { record_len }
    }
}

impl Filter for RecordFramingFilter {
    fn setup(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn cleanup(&self) {}
    fn ul_read_pending(&self) -> bool {
        false
    }
    fn ll_write_pending(&self) -> bool {
        false
    }
    fn ll_read_needed(&self) -> bool {
        false
    }
    fn check_open_done(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn try_connect(&self) -> TryStepOutcome {
        TryStepOutcome::Done
    }
    fn try_disconnect(&self) -> TryStepOutcome {
        TryStepOutcome::Done
    }
    fn ul_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError> {
        sink(buf)
    }
    fn ll_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError> {
        let complete = (buf.len() / self.record_len) * self.record_len;
        if complete > 0 {
            sink(&buf[..complete])?;
        }
        Ok(complete)
    }
}

/// A handshake filter whose `try_connect` requests `retries` timed retries
/// before finally succeeding — scenario S3. Otherwise behaves like
/// [`PassthroughFilter`].
pub struct RetryHandshakeFilter {
    remaining: AtomicU32,
    retry_after: Duration,
    attempts_seen: AtomicU32,
}

impl RetryHandshakeFilter {
    pub fn new(retries: u32, retry_after: Duration) -> Self {
        Self {
            remaining: AtomicU32::new(retries),
            retry_after,
            attempts_seen: AtomicU32::new(0),
        }
    }

    pub fn attempts_seen(&self) -> u32 {
        self.attempts_seen.load(Ordering::SeqCst)
    }
}

impl Filter for RetryHandshakeFilter {
    fn setup(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn cleanup(&self) {}
    fn ul_read_pending(&self) -> bool {
        false
    }
    fn ll_write_pending(&self) -> bool {
        false
    }
    fn ll_read_needed(&self) -> bool {
        false
    }
    fn check_open_done(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn try_connect(&self) -> TryStepOutcome {
        self.attempts_seen.fetch_add(1, Ordering::SeqCst);
        let prev = self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            Some(n.saturating_sub(1))
        });
        match prev {
            Ok(0) => TryStepOutcome::Done,
            Ok(_) => TryStepOutcome::RetryAfter(self.retry_after),
            Err(_) => TryStepOutcome::Done,
        }
    }
    fn try_disconnect(&self) -> TryStepOutcome {
        TryStepOutcome::Done
    }
    fn ul_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError> {
        sink(buf)
    }
    fn ll_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError> {
        sink(buf)
    }
}

/// Records every `read_callback`/`write_callback`/`urgent_callback`
/// invocation so assertions can inspect delivery order without racing a
/// background thread by hand.
#[derive(Default)]
pub struct RecordingHandlers {
    pub delivered: Mutex<Vec<u8>>,
    pub last_read_err: Mutex<Option<String>>,
    pub write_ready_count: AtomicUsize,
    pub urgent_count: AtomicUsize,
}

impl RecordingHandlers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl EndpointHandlers for RecordingHandlers {
    fn on_read(&self, data: Result<&[u8], &EndpointError>) -> usize {
        match data {
            Ok(bytes) => {
                self.delivered.lock().extend_from_slice(bytes);
                bytes.len()
            }
            Err(err) => {
                *self.last_read_err.lock() = Some(err.to_string());
                0
            }
        }
    }
    fn on_write_ready(&self) {
        self.write_ready_count.fetch_add(1, Ordering::SeqCst);
    }
    fn on_urgent(&self) {
        self.urgent_count.fetch_add(1, Ordering::SeqCst);
    }
}
