//! The engine itself: state controller (§4.1), event router (§4.2), enable
//! arbiter glue (§4.3 lives in `crate::arbiter`), lifetime manager (§4.4) and
//! deferred-op driver (§4.5), all wired together around a single
//! `parking_lot::Mutex<Bookkeeping>`.
//!
//! # 设计背景（Why） — 生命周期管理的 Rust 化
//! 手工 `refcount`/`freeref` 计数表达的是"这个对象还有多少个理由活着"。在 Rust
//! 里，"还有多少个理由活着"本来就是 `Arc` 的强引用计数，没有理由用另一套手工
//! 计数去平行维护、也容易在某条路径忘记 `++`/`--`。
//!
//! # 逻辑解析（How）
//! 每一个异步义务——LL `open`/`close` 飞行中、定时器已 armed、deferred-op 已
//! 提交——都通过把一份 `Arc<EndpointCore>` 克隆捕获进对应的 `on_done`/`on_fire`
//! 闭包来表达；只要义务未完成，闭包不会被丢弃，`Arc` 强计数就不会降到 0，
//! `EndpointCore` 就不会被析构。`freeref`（用户可见引用计数）则保留为一个独立
//! 的 `u32` 字段，只驱动"是否该发起关闭"这一业务语义，不参与内存回收——两个
//! 计数分别建模，不合并成一个。
//!
//! # 契约说明（What）
//! `Endpoint::ref_()` 等价于用户可见的 `ref()`；`Endpoint::free()` 等价于
//! `free()`，但其全部语义都收敛进 `Drop for Endpoint`，`free()` 只是一个让
//! 调用方能显式触发 drop 的薄包装。
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::action::{Action, ActionList};
use crate::arbiter::{self, ArbiterSnapshot};
use crate::config::EndpointConfig;
use crate::error::EndpointError;
use crate::filter::{Filter, TryStepOutcome};
use crate::handlers::{CloseDone, EndpointHandlers, OpenDone};
use crate::ll::{DeferredRunner, LlCloseCompletion, LlOpenCompletion, LowerLayer, SingleShotTimer};
use crate::state::State;

/// Everything the lock protects. Filter and LL themselves live on
/// `EndpointCore` (outside this struct) since their methods take `&self`
/// and every call site here already runs with `bk` locked, which serializes
/// access just as effectively without forcing the filter's reference to be
/// re-derived from inside the guard on every call.
struct Bookkeeping {
    state: State,
    freeref: u32,
    read_enabled: bool,
    xmit_enabled: bool,
    tmp_xmit_enabled: bool,
    in_read: bool,
    ll_err_occurred: bool,
    deferred_op_pending: bool,
    deferred_open: bool,
    deferred_close: bool,
    deferred_read: bool,
    saved_xmit_err: Option<EndpointError>,
    open_done: Option<OpenDone>,
    close_done: Option<CloseDone>,
    /// Guards invariant 3 / the "close during `OpeningLl`" Open Question: set
    /// while an LL `open` call is outstanding, cleared exactly once either by
    /// the real completion or by a close-in-place that supersedes it.
    ll_open_pending: bool,
    /// Set when we enter `ClosingLl` because the open attempt is being
    /// aborted (filter/LL failure); `step_finish_ll_close` reads this to
    /// decide whether to fire `open_done(err)` instead of `close_done`.
    pending_open_abort_err: Option<EndpointError>,
    retry_attempt: u32,
    /// Raw LL bytes the filter did not consume on the last `ll_write` call
    /// (partial consumption, e.g. an incomplete TLS record). Prepended to
    /// the next `core.ll.read` chunk so they are not silently dropped.
    pending_raw: Vec<u8>,
}

impl Bookkeeping {
    fn new(state: State) -> Self {
        Self {
            state,
            freeref: 1,
            read_enabled: false,
            xmit_enabled: false,
            tmp_xmit_enabled: false,
            in_read: false,
            ll_err_occurred: false,
            deferred_op_pending: false,
            deferred_open: false,
            deferred_close: false,
            deferred_read: false,
            saved_xmit_err: None,
            open_done: None,
            close_done: None,
            ll_open_pending: false,
            pending_open_abort_err: None,
            retry_attempt: 0,
            pending_raw: Vec::new(),
        }
    }
}

pub(crate) struct EndpointCore {
    bk: Mutex<Bookkeeping>,
    ll: Arc<dyn LowerLayer>,
    filter: Option<Box<dyn Filter>>,
    handlers: Arc<dyn EndpointHandlers>,
    timer: Arc<dyn SingleShotTimer>,
    runner: Arc<dyn DeferredRunner>,
    config: EndpointConfig,
    self_weak: Weak<EndpointCore>,
}

impl EndpointCore {
    fn strong(&self) -> Arc<EndpointCore> {
        self.self_weak
            .upgrade()
            .expect("EndpointCore dropped while still reachable")
    }

    /// Re-acquires the lock fresh and runs `step`, then drains whatever
    /// actions it queued. Used as the target of every boxed completion
    /// closure (LL open/close done, timer fire, deferred run), all of which
    /// execute with no ambient lock held.
    fn run_locked(self: Arc<Self>, step: impl FnOnce(&EndpointCore, &mut Bookkeeping, &mut ActionList)) {
        let mut actions = Vec::new();
        {
            let mut bk = self.bk.lock();
            step(&self, &mut bk, &mut actions);
            enforce_enables(&self, &bk);
        }
        self.drive(actions);
    }

    fn on_ll_open_done(self: Arc<Self>, result: Result<(), EndpointError>) {
        self.run_locked(move |core, bk, actions| {
            if !bk.ll_open_pending {
                trace!("stale LL open completion after close-in-place; ignoring");
                return;
            }
            bk.ll_open_pending = false;
            match result {
                Ok(()) => {
                    debug!("LL open completed; entering OpeningFilter");
                    bk.state = State::OpeningFilter;
                    match core.filter.as_deref().map(Filter::setup) {
                        Some(Err(err)) => begin_abort_open(core, bk, actions, err),
                        _ => step_drive_try_connect(core, bk, actions),
                    }
                }
                Err(err) => {
                    warn!(error = %err, "LL open failed");
                    bk.state = State::Closed;
                    if let Some(done) = bk.open_done.take() {
                        actions.push(Action::FireOpenDone(done, Err(err)));
                    }
                }
            }
        });
    }

    fn run_deferred(self: Arc<Self>) {
        let mut actions = Vec::new();
        {
            let mut bk = self.bk.lock();
            loop {
                if bk.deferred_open {
                    bk.deferred_open = false;
                    step_drive_try_connect(&self, &mut bk, &mut actions);
                } else if bk.deferred_close {
                    bk.deferred_close = false;
                    match bk.state {
                        State::Open => begin_close_from_open(&self, &mut bk, &mut actions),
                        State::OpeningLl => begin_closing_ll(&self, &mut bk, &mut actions),
                        State::OpeningFilter => begin_closing_filter(&self, &mut bk, &mut actions),
                        _ => {}
                    }
                } else if bk.deferred_read {
                    bk.deferred_read = false;
                    step_redeliver_buffered(&self, &mut bk, &mut actions);
                    bk.in_read = false;
                } else {
                    break;
                }
            }
            bk.deferred_op_pending = false;
            enforce_enables(&self, &bk);
        }
        self.drive(actions);
    }

    fn drive(&self, actions: ActionList) {
        for action in actions {
            match action {
                Action::CallUserRead { data } => match &data {
                    Ok(bytes) => {
                        let _consumed = self.handlers.on_read(Ok(bytes));
                        // Partial consumption (returning less than bytes.len())
                        // cannot be handed back to the filter after the fact in
                        // this implementation; see DESIGN.md for the resolved
                        // trade-off. We still surface the value for handlers
                        // that want to assert on it in tests.
                    }
                    Err(err) => {
                        let _consumed = self.handlers.on_read(Err(err));
                    }
                },
                Action::CallUserWrite => self.handlers.on_write_ready(),
                Action::CallUserUrgent => self.handlers.on_urgent(),
                Action::FireOpenDone(done, result) => done(result),
                Action::FireCloseDone(done) => done(),
                Action::FilterTimeout => {
                    if let Some(filter) = self.filter.as_deref() {
                        filter.timeout();
                    }
                }
            }
        }
    }
}

enum DeferredFlag {
    Open,
    Close,
    Read,
}

fn schedule_deferred(core: &EndpointCore, bk: &mut Bookkeeping, flag: DeferredFlag) {
    match flag {
        DeferredFlag::Open => bk.deferred_open = true,
        DeferredFlag::Close => bk.deferred_close = true,
        DeferredFlag::Read => bk.deferred_read = true,
    }
    if !bk.deferred_op_pending {
        bk.deferred_op_pending = true;
        let strong = core.strong();
        core.runner.submit(Box::new(move || strong.run_deferred()));
    }
}

fn enforce_enables(core: &EndpointCore, bk: &Bookkeeping) {
    let snap = ArbiterSnapshot {
        state: bk.state,
        read_enabled: bk.read_enabled,
        xmit_enabled: bk.xmit_enabled,
        tmp_xmit_enabled: bk.tmp_xmit_enabled,
        in_read: bk.in_read,
    };
    let filter = core.filter.as_deref();
    core.ll
        .set_read_callback_enable(arbiter::desired_ll_read(snap, filter));
    core.ll
        .set_write_callback_enable(arbiter::desired_ll_write(snap, filter));
}

fn arm_timer_for(core: &EndpointCore, dur: Duration) {
    let strong = core.strong();
    core.timer.arm(
        dur,
        Box::new(move || {
            strong.run_locked(|core, bk, actions| step_on_timer_fire(core, bk, actions));
        }),
    );
}

fn finish_open_success(_core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    bk.state = State::Open;
    bk.retry_attempt = 0;
    if let Some(done) = bk.open_done.take() {
        actions.push(Action::FireOpenDone(done, Ok(())));
    }
}

fn step_drive_try_connect(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    let Some(filter) = core.filter.as_deref() else {
        finish_open_success(core, bk, actions);
        return;
    };
    match filter.try_connect() {
        TryStepOutcome::Done => match filter.check_open_done() {
            Ok(()) => finish_open_success(core, bk, actions),
            Err(err) => begin_abort_open(core, bk, actions, err),
        },
        TryStepOutcome::InProgress => {}
        TryStepOutcome::RetryAfter(requested) => {
            bk.retry_attempt += 1;
            arm_timer_for(core, core.config.clamp_retry(requested));
        }
        TryStepOutcome::Err(err) => begin_abort_open(core, bk, actions, err),
    }
}

fn step_drive_try_disconnect(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    if bk.ll_err_occurred {
        // §4.1 tie-break: LL is already dead, skip the graceful filter
        // disconnect handshake entirely.
        begin_closing_ll(core, bk, actions);
        return;
    }
    let Some(filter) = core.filter.as_deref() else {
        begin_closing_ll(core, bk, actions);
        return;
    };
    match filter.try_disconnect() {
        TryStepOutcome::Done => begin_closing_ll(core, bk, actions),
        TryStepOutcome::InProgress => {}
        TryStepOutcome::RetryAfter(requested) => {
            bk.retry_attempt += 1;
            arm_timer_for(core, core.config.clamp_retry(requested));
        }
        TryStepOutcome::Err(err) => {
            // §7: close never surfaces an error; force through to LL close.
            warn!(error = %err, "filter try_disconnect failed; forcing LL close");
            begin_closing_ll(core, bk, actions);
        }
    }
}

fn begin_closing_filter(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    bk.state = State::ClosingFilter;
    step_drive_try_disconnect(core, bk, actions);
}

fn begin_closing_ll(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    bk.state = State::ClosingLl;
    let strong = core.strong();
    let on_done = Box::new(move || {
        strong.run_locked(|core, bk, actions| step_finish_ll_close(core, bk, actions));
    });
    match core.ll.close(on_done) {
        LlCloseCompletion::InProgress => {}
        LlCloseCompletion::Done => step_finish_ll_close(core, bk, actions),
    }
}

/// An open attempt can no longer progress (filter handshake failure or an
/// LL read error mid-open): record why and drive straight to `ClosingLl`.
fn begin_abort_open(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList, err: EndpointError) {
    debug!(error = %err, "aborting open attempt");
    bk.pending_open_abort_err = Some(err);
    begin_closing_ll(core, bk, actions);
}

fn begin_close_from_open(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    let draining = core.filter.as_deref().is_some_and(Filter::ll_write_pending);
    if draining {
        bk.state = State::CloseWaitDrain;
    } else {
        begin_closing_filter(core, bk, actions);
    }
}

fn step_finish_ll_close(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    bk.state = State::Closed;
    if let Some(filter) = core.filter.as_deref() {
        filter.cleanup();
    }
    core.timer.cancel();
    bk.ll_err_occurred = false;
    bk.retry_attempt = 0;
    bk.read_enabled = false;
    bk.xmit_enabled = false;
    bk.tmp_xmit_enabled = false;
    if let Some(err) = bk.pending_open_abort_err.take() {
        if let Some(done) = bk.open_done.take() {
            actions.push(Action::FireOpenDone(done, Err(err)));
        }
        bk.close_done = None;
    } else if let Some(done) = bk.close_done.take() {
        actions.push(Action::FireCloseDone(done));
    }
}

fn step_user_close(
    core: &EndpointCore,
    bk: &mut Bookkeeping,
    actions: &mut ActionList,
    done: CloseDone,
) -> Result<(), EndpointError> {
    match bk.state {
        State::Open => {
            bk.close_done = Some(done);
            begin_close_from_open(core, bk, actions);
            Ok(())
        }
        State::OpeningLl => {
            bk.close_done = Some(done);
            bk.open_done = None;
            bk.ll_open_pending = false;
            begin_closing_ll(core, bk, actions);
            Ok(())
        }
        State::OpeningFilter => {
            bk.close_done = Some(done);
            bk.open_done = None;
            begin_closing_filter(core, bk, actions);
            Ok(())
        }
        _ => Err(EndpointError::busy(
            "close: endpoint not closable from current state",
        )),
    }
}

fn trigger_close_on_final_release(core: &EndpointCore, bk: &mut Bookkeeping) {
    match bk.state {
        State::Closed => {}
        s if s.is_closing() => bk.close_done = None,
        _ => {
            bk.open_done = None;
            bk.ll_open_pending = false;
            schedule_deferred(core, bk, DeferredFlag::Close);
        }
    }
}

fn step_on_ll_readable(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    core.ll.set_read_callback_enable(false);
    if bk.in_read {
        // A previous delivery is still in flight on another thread/callback;
        // do not race it by reading more (invariant 4).
        return;
    }

    let mut buf = [0u8; 8192];
    match core.ll.read(&mut buf) {
        Err(err) => {
            bk.read_enabled = false;
            bk.ll_err_occurred = true;
            if bk.state.is_opening() {
                begin_abort_open(core, bk, actions, err);
            } else if matches!(bk.state, State::CloseWaitDrain | State::ClosingFilter) {
                begin_closing_ll(core, bk, actions);
            } else if bk.state == State::Open {
                bk.in_read = true;
                actions.push(Action::CallUserRead { data: Err(err) });
            }
        }
        Ok(0) => {
            bk.read_enabled = false;
            if bk.state.is_opening() {
                begin_abort_open(core, bk, actions, EndpointError::communication("ll eof during open"));
            } else if matches!(bk.state, State::CloseWaitDrain | State::ClosingFilter) {
                begin_closing_ll(core, bk, actions);
            } else if bk.state == State::Open {
                bk.in_read = true;
                actions.push(Action::CallUserRead { data: Ok(Vec::new()) });
            }
        }
        Ok(n) => {
            let mut raw = std::mem::take(&mut bk.pending_raw);
            raw.extend_from_slice(&buf[..n]);
            let mut delivered = Vec::new();
            let outcome = if let Some(filter) = core.filter.as_deref() {
                let mut sink = |chunk: &[u8]| -> Result<usize, EndpointError> {
                    delivered.extend_from_slice(chunk);
                    Ok(chunk.len())
                };
                filter.ll_write(&raw, &mut sink)
            } else {
                delivered.extend_from_slice(&raw);
                Ok(raw.len())
            };
            match outcome {
                Err(err) => {
                    // §9 "FIXME: error handling?" resolved: a filter failure
                    // mid-read is treated like a dead LL and forces a close.
                    warn!(error = %err, "filter rejected LL bytes; forcing close");
                    bk.ll_err_occurred = true;
                    begin_closing_ll(core, bk, actions);
                }
                Ok(consumed) => {
                    // The filter may not consume every raw byte in one call
                    // (e.g. an incomplete TLS record); stash the remainder so
                    // it is not lost, and prepend it to the next LL read.
                    if consumed < raw.len() {
                        bk.pending_raw = raw.split_off(consumed);
                    }
                    match bk.state {
                        State::Open => {
                            if bk.read_enabled && !delivered.is_empty() {
                                bk.in_read = true;
                                actions.push(Action::CallUserRead { data: Ok(delivered) });
                            }
                        }
                        State::OpeningFilter => step_drive_try_connect(core, bk, actions),
                        State::ClosingFilter => step_drive_try_disconnect(core, bk, actions),
                        _ => {}
                    }
                }
            }
        }
    }
}

fn step_on_ll_write_ready(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    core.ll.set_write_callback_enable(false);

    if let Some(filter) = core.filter.as_deref() {
        if filter.ll_write_pending() {
            let mut sink = |chunk: &[u8]| -> Result<usize, EndpointError> { core.ll.write(chunk) };
            if let Err(err) = filter.ul_write(&[], &mut sink) {
                bk.saved_xmit_err = Some(err);
            }
        }
    }
    let still_pending = core.filter.as_deref().is_some_and(Filter::ll_write_pending);

    if bk.state == State::CloseWaitDrain && !still_pending {
        begin_closing_filter(core, bk, actions);
    } else {
        match bk.state {
            State::OpeningFilter => step_drive_try_connect(core, bk, actions),
            State::ClosingFilter => step_drive_try_disconnect(core, bk, actions),
            _ => {}
        }
    }

    if bk.xmit_enabled && !still_pending && !bk.state.is_opening() {
        actions.push(Action::CallUserWrite);
    }
    bk.tmp_xmit_enabled = false;
}

fn step_on_ll_urgent(core: &EndpointCore, bk: &Bookkeeping, actions: &mut ActionList) {
    let _ = bk;
    if let Some(filter) = core.filter.as_deref() {
        filter.ll_urgent();
    } else {
        actions.push(Action::CallUserUrgent);
    }
}

fn step_on_timer_fire(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    match bk.state {
        State::OpeningFilter => step_drive_try_connect(core, bk, actions),
        State::ClosingFilter => step_drive_try_disconnect(core, bk, actions),
        State::Open => actions.push(Action::FilterTimeout),
        _ => {}
    }
}

fn step_redeliver_buffered(core: &EndpointCore, bk: &mut Bookkeeping, actions: &mut ActionList) {
    if bk.state != State::Open {
        return;
    }
    if let Some(filter) = core.filter.as_deref() {
        let mut delivered = Vec::new();
        let mut sink = |chunk: &[u8]| -> Result<usize, EndpointError> {
            delivered.extend_from_slice(chunk);
            Ok(chunk.len())
        };
        if filter.ll_write(&[], &mut sink).is_ok() && bk.read_enabled && !delivered.is_empty() {
            actions.push(Action::CallUserRead { data: Ok(delivered) });
        }
    }
}

/// The public handle. Does not implement `Clone`: the only way to obtain a
/// second handle is [`Endpoint::ref_`], which bumps `freeref` the way the
/// source's `ref()` does — plain `Arc::clone` would bypass that bookkeeping.
pub struct Endpoint(Arc<EndpointCore>);

impl Endpoint {
    /// Client-side construction (§3 Lifecycle): born `Closed`; call
    /// [`Endpoint::open`] to drive `OpeningLl → OpeningFilter → Open`.
    pub fn connect(
        ll: Arc<dyn LowerLayer>,
        filter: Option<Box<dyn Filter>>,
        handlers: Arc<dyn EndpointHandlers>,
        timer: Arc<dyn SingleShotTimer>,
        runner: Arc<dyn DeferredRunner>,
        config: EndpointConfig,
    ) -> Self {
        let core = Arc::new_cyclic(|weak| EndpointCore {
            bk: Mutex::new(Bookkeeping::new(State::Closed)),
            ll,
            filter,
            handlers,
            timer,
            runner,
            config,
            self_weak: weak.clone(),
        });
        Endpoint(core)
    }

    /// Server-side construction (§3 Lifecycle): born `OpeningFilter` with
    /// `tmp_xmit_enabled` set so the handshake is kicked without needing a
    /// synthetic write-ready event. Per §9's Open Question resolution (see
    /// `DESIGN.md`), the handshake's first step is driven from the deferred
    /// runner rather than from a write-ready bootstrap.
    pub fn accept(
        ll: Arc<dyn LowerLayer>,
        filter: Option<Box<dyn Filter>>,
        handlers: Arc<dyn EndpointHandlers>,
        timer: Arc<dyn SingleShotTimer>,
        runner: Arc<dyn DeferredRunner>,
        config: EndpointConfig,
        open_done: Option<OpenDone>,
    ) -> Result<Self, EndpointError> {
        if let Some(filter) = filter.as_deref() {
            filter.setup()?;
        }
        let core = Arc::new_cyclic(|weak| EndpointCore {
            bk: Mutex::new(Bookkeeping::new(State::OpeningFilter)),
            ll,
            filter,
            handlers,
            timer,
            runner,
            config,
            self_weak: weak.clone(),
        });
        {
            let mut bk = core.bk.lock();
            bk.open_done = open_done;
            bk.tmp_xmit_enabled = true;
            schedule_deferred(&core, &mut bk, DeferredFlag::Open);
            enforce_enables(&core, &bk);
        }
        Ok(Endpoint(core))
    }

    /// Only valid from `Closed`; otherwise `Busy`.
    pub fn open(&self, done: OpenDone) -> Result<(), EndpointError> {
        let core = &self.0;
        let mut actions = Vec::new();
        let mut bk = core.bk.lock();
        if bk.state != State::Closed {
            return Err(EndpointError::busy("open: endpoint not Closed"));
        }
        let strong = core.strong();
        let on_done = Box::new(move |result: Result<(), EndpointError>| strong.on_ll_open_done(result));
        match core.ll.open(on_done) {
            LlOpenCompletion::InProgress => {
                bk.state = State::OpeningLl;
                bk.ll_open_pending = true;
                bk.open_done = Some(done);
            }
            LlOpenCompletion::Done(Ok(())) => {
                bk.state = State::OpeningFilter;
                bk.open_done = Some(done);
                match core.filter.as_deref().map(Filter::setup) {
                    Some(Err(err)) => begin_abort_open(core, &mut bk, &mut actions, err),
                    _ => schedule_deferred(core, &mut bk, DeferredFlag::Open),
                }
            }
            LlOpenCompletion::Done(Err(err)) => {
                actions.push(Action::FireOpenDone(done, Err(err)));
            }
        }
        enforce_enables(core, &bk);
        drop(bk);
        core.drive(actions);
        Ok(())
    }

    /// Only valid from `Open`, `OpeningLl`, `OpeningFilter`; else `Busy`.
    pub fn close(&self, done: CloseDone) -> Result<(), EndpointError> {
        let core = &self.0;
        let mut actions = Vec::new();
        let mut bk = core.bk.lock();
        let result = step_user_close(core, &mut bk, &mut actions, done);
        enforce_enables(core, &bk);
        drop(bk);
        core.drive(actions);
        result
    }

    /// `BadEndpoint` if not `Open`; otherwise surfaces any `saved_xmit_err`
    /// exactly once before attempting a fresh write (§7).
    pub fn write(&self, buf: &[u8]) -> Result<usize, EndpointError> {
        let core = &self.0;
        let mut bk = core.bk.lock();
        if let Some(err) = bk.saved_xmit_err.take() {
            return Err(err);
        }
        if bk.state != State::Open {
            return Err(EndpointError::bad_endpoint("write: endpoint not Open"));
        }
        let result = if let Some(filter) = core.filter.as_deref() {
            let mut sink = |chunk: &[u8]| -> Result<usize, EndpointError> { core.ll.write(chunk) };
            filter.ul_write(buf, &mut sink)
        } else {
            core.ll.write(buf)
        };
        enforce_enables(core, &bk);
        result
    }

    /// Increments `freeref` and returns a new handle sharing the same
    /// underlying endpoint (spec's `ref()` — renamed to avoid the reserved
    /// keyword).
    pub fn ref_(&self) -> Endpoint {
        let core = &self.0;
        let mut bk = core.bk.lock();
        bk.freeref += 1;
        Endpoint(Arc::clone(core))
    }

    /// Decrements `freeref`; the last release triggers an internal close if
    /// the endpoint wasn't already closed/closing (§4.4). All of the actual
    /// bookkeeping lives in `Drop`, so this is a documented alias for it.
    pub fn free(self) {}

    pub fn set_read_callback_enable(&self, enable: bool) {
        let core = &self.0;
        let mut bk = core.bk.lock();
        bk.read_enabled = enable;
        if enable
            && bk.state == State::Open
            && core.filter.as_deref().is_some_and(Filter::ul_read_pending)
        {
            schedule_deferred(core, &mut bk, DeferredFlag::Read);
        }
        enforce_enables(core, &bk);
    }

    pub fn set_write_callback_enable(&self, enable: bool) {
        let core = &self.0;
        let mut bk = core.bk.lock();
        bk.xmit_enabled = enable;
        enforce_enables(core, &bk);
    }

    pub fn raddr_to_str(&self) -> Option<String> {
        self.0.ll.raddr_to_str()
    }

    pub fn remote_id(&self) -> Option<u64> {
        self.0.ll.remote_id()
    }

    /// Not part of the spec's stable API; exposed for tests and diagnostics
    /// (§8 property 1: "observable `state`").
    pub fn current_state(&self) -> State {
        self.0.bk.lock().state
    }

    /// LL read-ready event entry point (§4.2).
    pub fn on_ll_readable(&self) {
        let core = &self.0;
        let mut actions = Vec::new();
        let delivered;
        {
            let mut bk = core.bk.lock();
            step_on_ll_readable(core, &mut bk, &mut actions);
            delivered = actions
                .iter()
                .any(|a| matches!(a, Action::CallUserRead { .. }));
            enforce_enables(core, &bk);
        }
        core.drive(actions);
        if delivered {
            let mut bk = core.bk.lock();
            bk.in_read = false;
            enforce_enables(core, &bk);
        }
    }

    /// LL write-ready event entry point (§4.2).
    pub fn on_ll_write_ready(&self) {
        let core = &self.0;
        let mut actions = Vec::new();
        {
            let mut bk = core.bk.lock();
            step_on_ll_write_ready(core, &mut bk, &mut actions);
            enforce_enables(core, &bk);
        }
        core.drive(actions);
    }

    /// LL urgent/out-of-band event entry point (§4.2).
    pub fn on_ll_urgent(&self) {
        let core = &self.0;
        let mut actions = Vec::new();
        {
            let bk = core.bk.lock();
            step_on_ll_urgent(core, &bk, &mut actions);
        }
        core.drive(actions);
    }

    /// Shared timer fire entry point (§4.6).
    pub fn on_timer_fire(&self) {
        let core = &self.0;
        let mut actions = Vec::new();
        {
            let mut bk = core.bk.lock();
            step_on_timer_fire(core, &mut bk, &mut actions);
            enforce_enables(core, &bk);
        }
        core.drive(actions);
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let core = &self.0;
        let mut bk = core.bk.lock();
        if bk.freeref > 0 {
            bk.freeref -= 1;
            if bk.freeref == 0 {
                trigger_close_on_final_release(core, &mut bk);
            }
        }
        enforce_enables(core, &bk);
    }
}
