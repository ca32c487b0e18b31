//! Concurrency checks for the lifetime manager (§4.4, §8 invariants 4 & 5).
//!
//! # 设计背景（Why）
//! `refcount`（内部强引用义务）与 `freeref`（用户可见引用）是两套独立计数，
//! 刻意不合并。真正的内存安全已经由 `Arc<EndpointCore>` 保证，但 `freeref`
//! 归零后"不得再触发用户回调"这条业务不变式（invariant 5）仍然是手写逻辑，
//! 值得专门检验。
//!
//! # 逻辑解析（How）
//! - `#[cfg(not(loom))]` 下，针对真实的 `Endpoint`/`ThreadRunner`/`StdTimer`
//!   跑一次"并发 `ref_`/drop 风暴 + 一次显式 `close`"的压力测试，用一个
//!   channel 等待 `close_done` 恰好触发一次。
//! - `#[cfg(loom)]` 下，`parking_lot::Mutex` 与真正的 OS 线程都不是 loom
//!   可穷举的原语；对 `EndpointCore` 直接做模型检验需要把它的每一个同步原语
//!   都换成 `loom::sync` 版本，这是一次足以影响整个 `endpoint` 模块的结构性
//!   改动，超出了本次变更的范围（决策记录见 `DESIGN.md`）。退而求其次：本
//!   模块复刻"两套独立计数、后者归零触发关闭"这一最小模式，用 loom 的原语
//!   重新实现一遍并做模型检验，以验证该*模式*本身在所有调度交织下都不会
//!   出现计数下溢或重复释放，而不是验证 `EndpointCore` 这份具体代码。
//!
//! # 契约说明（What）
//! 两个模块都只在 `test`/`loom` 构建下编译，不影响正常发布构建的产物体积。

#[cfg(not(loom))]
mod live_stress {
    use crate::config::EndpointConfig;
    use crate::endpoint::Endpoint;
    use crate::error::EndpointError;
    use crate::handlers::EndpointHandlers;
    use crate::host::{StdTimer, ThreadRunner};
    use crate::ll::{LlCloseCompletion, LlOpenCompletion, LowerLayer, PeerDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    /// Completes `open`/`close` synchronously with no bytes ever pending;
    /// exists purely to drive the real refcount/freeref machinery without
    /// involving actual I/O.
    #[derive(Default)]
    struct ImmediateLl;

    impl PeerDescriptor for ImmediateLl {
        fn raddr_to_str(&self) -> Option<String> {
            None
        }
        fn remote_id(&self) -> Option<u64> {
            None
        }
    }

    impl LowerLayer for ImmediateLl {
        fn read(&self, _buf: &mut [u8]) -> Result<usize, EndpointError> {
            Ok(0)
        }
        fn write(&self, buf: &[u8]) -> Result<usize, EndpointError> {
            Ok(buf.len())
        }
        fn open(
            &self,
            _on_done: Box<dyn FnOnce(Result<(), EndpointError>) + Send>,
        ) -> LlOpenCompletion {
            LlOpenCompletion::Done(Ok(()))
        }
        fn close(&self, _on_done: Box<dyn FnOnce() + Send>) -> LlCloseCompletion {
            LlCloseCompletion::Done
        }
        fn set_read_callback_enable(&self, _enable: bool) {}
        fn set_write_callback_enable(&self, _enable: bool) {}
    }

    #[derive(Default)]
    struct NullHandlers;

    impl EndpointHandlers for NullHandlers {
        fn on_read(&self, _data: Result<&[u8], &EndpointError>) -> usize {
            0
        }
        fn on_write_ready(&self) {}
        fn on_urgent(&self) {}
    }

    fn spawn_endpoint() -> Endpoint {
        Endpoint::connect(
            Arc::new(ImmediateLl),
            None,
            Arc::new(NullHandlers) as Arc<dyn EndpointHandlers>,
            StdTimer::new(),
            ThreadRunner::new(),
            EndpointConfig::default(),
        )
    }

    /// Invariant 2 / property 2 of §8: `close_done` fires at most once even
    /// when `close` races a storm of concurrent `ref_`/drop traffic.
    #[test]
    fn concurrent_ref_storm_does_not_duplicate_close_done() {
        let endpoint = spawn_endpoint();

        let (open_tx, open_rx) = mpsc::channel();
        endpoint
            .open(Box::new(move |result| {
                let _ = open_tx.send(result);
            }))
            .expect("open from Closed must be accepted");
        open_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("open_done must fire")
            .expect("no-filter open over an immediate LL cannot fail");

        let extra_refs: Vec<Endpoint> = (0..32).map(|_| endpoint.ref_()).collect();
        let close_fired = Arc::new(AtomicUsize::new(0));
        let close_fired_for_closure = Arc::clone(&close_fired);

        std::thread::scope(|scope| {
            for handle in extra_refs {
                scope.spawn(move || drop(handle));
            }
        });

        let (close_tx, close_rx) = mpsc::channel();
        endpoint
            .close(Box::new(move || {
                close_fired_for_closure.fetch_add(1, Ordering::SeqCst);
                let _ = close_tx.send(());
            }))
            .expect("close from Open must be accepted");
        close_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("close_done must fire");

        assert_eq!(close_fired.load(Ordering::SeqCst), 1);
    }
}

#[cfg(loom)]
mod loom_model {
    use loom::sync::atomic::{AtomicUsize, Ordering};
    use loom::sync::Arc;

    /// Minimal reproduction of §4.4's "two independent reference counts":
    /// `strong` models the `Arc<EndpointCore>` obligations, `freeref` models
    /// the user-visible count. `release_user_ref` mirrors `Endpoint::drop`:
    /// decrementing `freeref` to zero schedules exactly one "close" (here,
    /// incrementing `closes_triggered`) without touching `strong` directly —
    /// the close path itself is what holds a `strong` obligation for the
    /// duration of the (simulated) teardown.
    struct Model {
        freeref: AtomicUsize,
        closes_triggered: AtomicUsize,
    }

    fn release_user_ref(model: &Arc<Model>) {
        let prev = model.freeref.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "freeref underflow: released more than acquired");
        if prev == 1 {
            model.closes_triggered.fetch_add(1, Ordering::AcqRel);
        }
    }

    #[test]
    fn freeref_reaches_zero_exactly_once_under_concurrent_release() {
        loom::model(|| {
            let model = Arc::new(Model {
                freeref: AtomicUsize::new(2),
                closes_triggered: AtomicUsize::new(0),
            });

            let m1 = Arc::clone(&model);
            let t1 = loom::thread::spawn(move || release_user_ref(&m1));
            let m2 = Arc::clone(&model);
            let t2 = loom::thread::spawn(move || release_user_ref(&m2));

            t1.join().unwrap();
            t2.join().unwrap();

            assert_eq!(model.closes_triggered.load(Ordering::Acquire), 1);
        });
    }
}
