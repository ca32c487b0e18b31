//! Property-based coverage for the enable arbiter (§4.3) and the legal-state
//! invariant (§8 property 1), referenced from `crate::arbiter`'s module doc.
//!
//! # 设计背景（Why）
//! `arbiter::desired_ll_read`/`desired_ll_write` 是纯函数，输入空间（状态 ×
//! 4 个布尔标志 × filter 的三个查询结果）小到可以穷举，但用 proptest 表达
//! 比手写笛卡尔积更贴近"这是一条永真的不变式"而不是"这是几个挑出来的例子"：
//! 用性质测试固化不变式，而不是逐状态枚举断言。
//!
//! # 逻辑解析（How）
//! `arbitrary_snapshot`/`arbitrary_filter_signals` 分别为 `ArbiterSnapshot`
//! 的五个字段与一个三标志 stub filter 生成策略；每条性质直接对照 §4.3 的
//! OR 合取表达式复述期望值，而不是重新调用被测函数本身。
//!
//! # 契约说明（What）
//! 这里只验证 arbiter 这一个纯函数层，不驱动完整的 `Endpoint`——完整状态机
//! 在 `spark-endpoint-tck` 的确定性场景里已经覆盖。
use proptest::prelude::*;
use spark_endpoint::arbiter::{ArbiterSnapshot, desired_ll_read, desired_ll_write};
use spark_endpoint::error::EndpointError;
use spark_endpoint::filter::{Filter, Sink, TryStepOutcome};
use spark_endpoint::state::State;

/// A filter stub whose three demand-signalling queries are independently
/// controlled, so the arbiter's OR-composition can be exercised against
/// every combination proptest samples.
struct SignalFilter {
    ul_read_pending: bool,
    ll_write_pending: bool,
    ll_read_needed: bool,
}

impl Filter for SignalFilter {
    fn setup(&self) -> Result<(), EndpointError> {
        Ok(())
    }
    fn cleanup(&self) {}
    fn ul_read_pending(&self) -> bool {
        self.ul_read_pending
    }
    fn ll_write_pending(&self) -> bool {
        self.ll_write_pending
    }
    fn ll_read_needed(&self) -> bool {
        self.ll_read_needed
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

fn arbitrary_state() -> impl Strategy<Value = State> {
    prop_oneof![
        Just(State::Closed),
        Just(State::OpeningLl),
        Just(State::OpeningFilter),
        Just(State::Open),
        Just(State::CloseWaitDrain),
        Just(State::ClosingFilter),
        Just(State::ClosingLl),
    ]
}

fn arbitrary_snapshot() -> impl Strategy<Value = ArbiterSnapshot> {
    (
        arbitrary_state(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(state, read_enabled, xmit_enabled, tmp_xmit_enabled, in_read)| ArbiterSnapshot {
                state,
                read_enabled,
                xmit_enabled,
                tmp_xmit_enabled,
                in_read,
            },
        )
}

fn arbitrary_filter() -> impl Strategy<Value = SignalFilter> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(ul_read_pending, ll_write_pending, ll_read_needed)| SignalFilter {
            ul_read_pending,
            ll_write_pending,
            ll_read_needed,
        },
    )
}

proptest! {
    /// §4.3: "LL read should be enabled if `in_read` is false AND ...". No
    /// combination of state/flags/filter signals can override `in_read`.
    #[test]
    fn in_read_always_suppresses_ll_read(snap in arbitrary_snapshot(), filter in arbitrary_filter()) {
        let mut snap = snap;
        snap.in_read = true;
        prop_assert!(!desired_ll_read(snap, Some(&filter)));
        prop_assert!(!desired_ll_read(snap, None));
    }

    /// §4.3: outside `Open` and the two handshaking states, LL read is never
    /// wanted, regardless of user-facing flags or filter signals.
    #[test]
    fn ll_read_is_closed_state_has_no_demand(snap in arbitrary_snapshot(), filter in arbitrary_filter()) {
        let mut snap = snap;
        snap.in_read = false;
        snap.state = State::Closed;
        prop_assert!(!desired_ll_read(snap, Some(&filter)));
    }

    /// §4.3's literal OR-composition for the `Open` branch, restated in
    /// terms of the same three booleans the production code reads.
    #[test]
    fn ll_read_in_open_matches_the_spec_formula(
        read_enabled in any::<bool>(),
        filter in arbitrary_filter(),
    ) {
        let snap = ArbiterSnapshot {
            state: State::Open,
            read_enabled,
            xmit_enabled: false,
            tmp_xmit_enabled: false,
            in_read: false,
        };
        let expected = (read_enabled && !filter.ul_read_pending) || filter.ll_read_needed;
        prop_assert_eq!(desired_ll_read(snap, Some(&filter)), expected);
    }

    /// §4.3: both handshaking states always want more raw bytes, independent
    /// of every other flag or filter signal.
    #[test]
    fn ll_read_always_wanted_while_handshaking(snap in arbitrary_snapshot(), filter in arbitrary_filter()) {
        prop_assume!(matches!(snap.state, State::OpeningFilter | State::ClosingFilter));
        let mut snap = snap;
        snap.in_read = false;
        prop_assert!(desired_ll_read(snap, Some(&filter)));
        prop_assert!(desired_ll_read(snap, None));
    }

    /// §4.3's literal OR-composition for LL write, across every state: the
    /// filter having bytes queued, `xmit_enabled`, or `tmp_xmit_enabled`
    /// alone is always sufficient, and none alone is necessary without the
    /// others.
    #[test]
    fn ll_write_matches_the_spec_formula(snap in arbitrary_snapshot(), filter in arbitrary_filter()) {
        let expected = filter.ll_write_pending || snap.xmit_enabled || snap.tmp_xmit_enabled;
        prop_assert_eq!(desired_ll_write(snap, Some(&filter)), expected);
        let expected_no_filter = snap.xmit_enabled || snap.tmp_xmit_enabled;
        prop_assert_eq!(desired_ll_write(snap, None), expected_no_filter);
    }
}
