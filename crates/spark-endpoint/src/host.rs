//! 宿主服务的默认实现（Ambient 5.1）：定时器与 deferred-op 执行器。
//!
//! # 设计背景（Why）
//! "打破锁嵌套的后台执行器"与"单次计时器"都是宿主职责，核心只依赖
//! `DeferredRunner`/`SingleShotTimer` 这两个 trait（见 `ll` 模块）。大多数
//! 嵌入者只是想要一个能在原生/`std` 环境下"正确工作"的默认实现，不想为此拉起
//! 一整个 async 运行时——事件模型本就是回调/reactor 式的，不是 `async/await`
//! 式的，因此这里特意不引入 `tokio`（决策记录见 `DESIGN.md`）。
//!
//! # 逻辑解析（How）
//! `ThreadRunner::submit` 直接 `std::thread::spawn` 一次性线程执行工作项；
//! `StdTimer` 同样用一次性线程睡眠到期，但额外维护一个"世代号"，`arm` 每次
//! 调用都会让世代号自增并让新线程只认自己捕获的那个世代号，`cancel`／重新
//! `arm` 都通过世代号失配让陈旧的到期回调静默失效，从而实现单次计时器
//! "重新预订覆盖旧预订"的语义，而不需要真正中断一个正在睡眠的线程。
//!
//! # 契约说明（What）
//! 两者都不持有任何跨调用的可变共享状态之外的东西，可以被多个 `Endpoint`
//! 安全共享一个实例。
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::ll::{DeferredRunner, SingleShotTimer};

/// 每任务一次性 OS 线程的 [`DeferredRunner`]。
///
/// 不做排队、不复用线程：deferred-op 本就应当是稀有事件（每次 open/close/read
/// 重投只触发一次），为此引入线程池的复杂度不划算；偏好"显式、可读的执行
/// 路径优于隐藏的调度器"。
#[derive(Debug, Default)]
pub struct ThreadRunner {
    _private: (),
}

impl ThreadRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { _private: () })
    }
}

impl DeferredRunner for ThreadRunner {
    fn submit(&self, work: Box<dyn FnOnce() + Send>) {
        std::thread::spawn(work);
    }
}

/// 基于一次性休眠线程 + 世代号的 [`SingleShotTimer`]。
///
/// 世代号存在独立的 `Arc` 里（而不是直接作为 `StdTimer` 的字段被借用），
/// 这样到期线程只需克隆这一个 `Arc<AtomicU64>` 就能在 `arm` 调用返回之后
/// 继续安全地访问它，不必以不安全的方式延长 `&self` 的生命周期。
#[derive(Debug, Default)]
pub struct StdTimer {
    generation: Arc<AtomicU64>,
}

impl StdTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            generation: Arc::new(AtomicU64::new(0)),
        })
    }
}

impl SingleShotTimer for StdTimer {
    fn arm(&self, after: Duration, on_fire: Box<dyn FnOnce() + Send>) {
        let expected = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        std::thread::spawn(move || {
            std::thread::sleep(after);
            if generation.load(Ordering::SeqCst) == expected {
                on_fire();
            }
        });
    }

    fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
