//! Contract test kit for `spark-endpoint`: reusable regression coverage for
//! the lifecycle scenarios and invariants an implementer of `LowerLayer`/
//! `Filter` is expected to uphold.
//!
//! # 设计背景（Why）
//! 核心 crate 只约定状态机与事件路由的语义，不对具体 LL/Filter 负责；本
//! crate 把场景 S1–S6 与 §8 的不变式固化为可复用的测试套件，供核心自身的
//! `tests/` 以及未来任何真实 LL/Filter 实现复用。
//!
//! # 逻辑解析（How）
//! `support` 模块集中维护测试替身（`LoopbackLl`、`PassthroughFilter`、
//! `DrainingFilter`、`RetryHandshakeFilter`、`RecordingHandlers`）；
//! `open_close`/`backpressure`/`errors`/`retries` 四个子模块各自实现一个
//! 主题下的用例，通过 `suite()` 暴露为 `'static` `TckSuite`。
//!
//! # 契约说明（What）
//! `all_suites()`/`run_*_suite()` 与宏共用同一组 `run_{name}_suite` 命名
//! 约定；新增主题时需同步更新 `ALL_SUITES` 与宏的默认套件列表
//! (`spark-endpoint-tck-macros`)。

mod backpressure;
mod errors;
mod open_close;
mod retries;
mod support;

use case::{TckSuite, run_suite};
pub use spark_endpoint_tck_macros::spark_endpoint_tck;
pub use support::{
    Completion, DrainingFilter, LoopbackLl, PassthroughFilter, RecordFramingFilter,
    RecordingHandlers, RetryHandshakeFilter,
};

const ALL_SUITES: [&TckSuite; 4] = [
    open_close::suite(),
    errors::suite(),
    retries::suite(),
    backpressure::suite(),
];

mod case {
    use super::support;
    use std::panic;

    /// A single named TCK case: a human-readable name plus the assertion it
    /// runs. Grouping these into a `const` array is what lets `TckSuite` be
    /// built at compile time and iterated uniformly by `run_suite`.
    #[derive(Clone, Copy)]
    pub struct TckCase {
        pub name: &'static str,
        pub test: fn(),
    }

    /// A named group of [`TckCase`]s covering one scenario family.
    #[derive(Clone, Copy)]
    pub struct TckSuite {
        pub name: &'static str,
        pub cases: &'static [TckCase],
    }

    /// Runs every case in `suite`, catching panics so a failure is re-raised
    /// with the suite/case name attached instead of an anonymous assertion
    /// line.
    pub fn run_suite(suite: &TckSuite) {
        assert!(!suite.cases.is_empty(), "TCK suite must not be empty");
        for case in suite.cases {
            let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| (case.test)()));
            if let Err(payload) = outcome {
                support::panic_with_context(suite.name, case.name, payload);
            }
        }
    }
}

/// All registered suites, in the order the macro's default expansion uses.
pub fn all_suites() -> &'static [&'static TckSuite] {
    &ALL_SUITES
}

/// Runs the open/close lifecycle suite (scenarios S1, S2).
pub fn run_open_close_suite() {
    run_suite(open_close::suite());
}

/// Runs the error-handling suite (scenario S4, plus write-error idempotence).
pub fn run_errors_suite() {
    run_suite(errors::suite());
}

/// Runs the handshake-retry suite (scenario S3).
pub fn run_retries_suite() {
    run_suite(retries::suite());
}

/// Runs the write-backpressure / drain-on-close suite (scenarios S5, S6).
pub fn run_backpressure_suite() {
    run_suite(backpressure::suite());
}
