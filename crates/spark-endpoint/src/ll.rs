//! 下层传输契约（LL，"lower-level transport"）。
//!
//! # 设计背景（Why）
//! `Endpoint` 必须对具体传输（TCP、Unix 管道……）保持无知，只依赖一个最小的、
//! 非阻塞的字节收发契约；本 trait 就是那个契约的对象安全形式。
//!
//! # 逻辑解析（How）
//! 采用"拉"模型而非"推"回调模型——宿主（事件源，如 epoll/kqueue 适配层）在
//! 侦测到可读/可写后调用 `Endpoint::on_ll_readable`/`on_ll_writable`，由
//! `Endpoint` 主动调用 `LowerLayer::read`/`write` 取数据，而不是让 LL 持有
//! 指向 `Endpoint` 的回调闭包。这避免了为支持"稍后回调"而必须装箱存储闭包的
//! 生命周期复杂度，用能力抽象替代函数指针表，在读写路径上更贴近 Rust 的
//! trait-object 习惯。
//!
//! # 契约说明（What）
//! `write` 允许部分写入（`Ok(0)` 表示当前不可写，调用方应已经通过
//! `set_write_callback_enable` 订阅了写就绪通知）；`open`/`close` 采用
//! "立即完成 / 异步完成"两态结果，因为握手建立/拆除往往确实需要真正异步等待
//! （DNS、TCP 三次握手……），`on_done` 在此情形下必须可以安全地从另一个线程
//! 调用，因此要求 `Send`。
use crate::error::EndpointError;
use std::time::Duration;

/// `open` 的非阻塞返回结果：同步完成（成功/失败）或异步完成。
#[derive(Debug)]
pub enum LlOpenCompletion {
    /// 操作已在调用栈内同步完成（成功或失败都可能）。
    Done(Result<(), EndpointError>),
    /// 操作已提交，结果将通过 `on_done` 异步通知恰好一次。
    InProgress,
}

/// `close` 的非阻塞返回结果；关闭永不失败（§7）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlCloseCompletion {
    /// 操作已在调用栈内同步完成。
    Done,
    /// 操作已提交，`on_done` 将异步通知恰好一次。
    InProgress,
}

/// 诊断用的对端描述，避免核心依赖具体地址类型。
pub trait PeerDescriptor {
    /// 返回人类可读的对端地址（如 `"10.0.0.8:4433"`），无法获取时返回 `None`。
    fn raddr_to_str(&self) -> Option<String>;
    /// 返回对端的稳定标识（实现可自由定义含义，例如连接 fd、会话号）。
    fn remote_id(&self) -> Option<u64>;
}

/// 下层传输的核心契约。
pub trait LowerLayer: PeerDescriptor + Send + Sync + 'static {
    /// 非阻塞读取；`Ok(0)` 表示对端已发送 EOF（spec §4.2 视作 `readerr == 0`
    /// 且后续不会再有数据，调用方据此停止重新使能读兴趣）。
    fn read(&self, buf: &mut [u8]) -> Result<usize, EndpointError>;

    /// 非阻塞写入，允许部分写入；`Ok(0)` 表示当前不可写（已订阅写就绪通知）。
    fn write(&self, buf: &[u8]) -> Result<usize, EndpointError>;

    /// 发起打开；`on_done` 仅在返回 [`LlOpenCompletion::InProgress`] 时才会被调用。
    fn open(
        &self,
        on_done: Box<dyn FnOnce(Result<(), EndpointError>) + Send>,
    ) -> LlOpenCompletion;

    /// 发起关闭；`on_done` 仅在返回 [`LlCloseCompletion::InProgress`] 时才会被
    /// 调用；关闭永不失败（§7："close 总是成功进入 Closed"）。
    fn close(&self, on_done: Box<dyn FnOnce() + Send>) -> LlCloseCompletion;

    /// 电平触发的读兴趣开关。由 `Endpoint` 在每个事件出口统一调用（见 `arbiter`），
    /// LL 自身不得擅自重新使能。
    fn set_read_callback_enable(&self, enable: bool);

    /// 电平触发的写兴趣开关，语义同上。
    fn set_write_callback_enable(&self, enable: bool);
}

/// 单次计时器的宿主契约（§3 `timer` 字段、§4.6）。
///
/// # 设计取舍与风险（Trade-offs）
/// 停止一个可能仍在飞行中的到期回调需要避免与停止请求互相踩踏。这里把
/// "计时器 armed"本身当作一次生命周期义务——`arm` 的调用方会把一份
/// `Arc<EndpointCore>` 克隆捕获进 `on_fire` 闭包里，因此只要计时器还 armed，
/// `Endpoint` 就不会被真正析构；`cancel` 只是尽力而为的提前丢弃，即使因竞态
/// 未能赶在到期前生效，`on_fire` 的回调体本身也会先检查当前状态，对过期的
/// 到期事件静默忽略（见 `endpoint::on_timer_fire`）。这避免了一个显式的两段式
/// 停止协议，同样满足"无悬挂回调"的安全性。
pub trait SingleShotTimer: Send + Sync + 'static {
    /// 预订在 `after` 之后触发一次 `on_fire`；多次调用应覆盖前一次预订（单次
    /// 计时器语义——旧的 `on_fire` 要么被丢弃要么不会再被调用）。
    fn arm(&self, after: Duration, on_fire: Box<dyn FnOnce() + Send>);

    /// 尽力而为地取消任何已预订但尚未触发的唤醒。
    fn cancel(&self);
}

/// 打破锁嵌套用的后台执行器（§4.5、§5.1）。
pub trait DeferredRunner: Send + Sync + 'static {
    /// 提交一个工作项，稍后（脱离当前调用栈与锁）执行一次。
    fn submit(&self, work: Box<dyn FnOnce() + Send>);
}
