//! 字节变换契约（Filter，例如 TLS、telnet 选项协商、SSL 式分帧）。
//!
//! # 设计背景（Why）
//! 核心对具体的字节变换算法一无所知，只要求一个能双向搬运字节、报告"还欠多少
//! 字节"的最小契约，从而可以用同一套状态机驱动 TLS、telnet 协商或纯透传。
//!
//! # 逻辑解析（How）
//! `try_connect`/`try_disconnect` 用 [`TryStepOutcome`] 表达四种结局
//! （完成/进行中/定时重试/失败），由状态控制器（`state` 模块）驱动到下一个
//! 状态；`ul_write`/`ll_write` 接受一个 `sink` 闭包参数，分别代表"写到 LL"与
//! "交付给用户"两个方向的下游，在 Rust 中用 `&mut dyn FnMut` 表达这一能力，
//! 避免为每个方向定义独立 trait。
//!
//! # 契约说明（What）
//! 这里故意省略了一个独立的"推式"输出就绪回调——核心在每次驱动 Filter 之后
//! 都会重新查询 `ll_write_pending`/`ul_read_pending`/`ll_read_needed`，属于
//! 轮询而非推送；决策记录见 `DESIGN.md`。
use crate::error::EndpointError;
use std::time::Duration;

/// `try_connect`/`try_disconnect` 单步驱动的结果。
#[derive(Debug)]
pub enum TryStepOutcome {
    /// 握手完成。
    Done,
    /// 握手仍在进行，等待下一次读/写就绪事件推进。
    InProgress,
    /// 握手当前无法再推进，需要在给定时长后重试（核心据此安排定时器，§4.6）。
    RetryAfter(Duration),
    /// 握手失败，不可恢复。
    Err(EndpointError),
}

/// 向下游投递字节的回调：返回实际被下游接受的字节数，可能小于 `buf.len()`
/// （背压）。`Err` 表示下游（LL 写入或用户读回调）本身报告了错误。
pub type Sink<'a> = dyn FnMut(&[u8]) -> Result<usize, EndpointError> + 'a;

/// 字节变换契约。
pub trait Filter: Send + Sync + 'static {
    /// 打开期间的一次性初始化。
    fn setup(&self) -> Result<(), EndpointError>;

    /// 关闭/销毁期间的一次性清理，不得失败。
    fn cleanup(&self);

    /// 是否有已解码但尚未交付给用户的字节。
    fn ul_read_pending(&self) -> bool;

    /// 是否有已编码但尚未写给 LL 的字节。
    fn ll_write_pending(&self) -> bool;

    /// Filter 是否需要更多原始字节才能推进（握手阶段常见）。
    fn ll_read_needed(&self) -> bool;

    /// 对已完成握手做最终校验（例如证书链校验）。
    fn check_open_done(&self) -> Result<(), EndpointError>;

    /// 驱动一步打开握手。
    fn try_connect(&self) -> TryStepOutcome;

    /// 驱动一步关闭握手。
    fn try_disconnect(&self) -> TryStepOutcome;

    /// 接受用户负载，编码后通过 `sink`（写往 LL）投递；返回从 `buf` 消费的字节数。
    fn ul_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError>;

    /// 接受 LL 原始字节，解码后通过 `sink`（交付给用户）投递；返回从 `buf` 消费
    /// 的字节数。若小于 `buf.len()`（例如一条不完整的 TLS 记录），核心会把未消费
    /// 的尾部暂存下来，拼接到下一次 `ll_read` 的新字节前面再次调用，Filter 自身
    /// 不需要为此维护一段额外的原始字节缓冲。
    fn ll_write(&self, buf: &[u8], sink: &mut Sink<'_>) -> Result<usize, EndpointError>;

    /// 带外通知（例如 TCP 紧急数据）。
    fn ll_urgent(&self) {}

    /// `Open` 状态下的周期性 tick（例如 telnet 重发协商提示）；默认无操作。
    fn timeout(&self) {}
}
