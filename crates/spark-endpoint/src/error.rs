//! 端点错误域：统一 LL/Filter 两层可能抛出的异构失败。
//!
//! # 设计背景（Why）
//! 将 LL/Filter 两层可能抛出的异构错误，收敛为调用方唯一需要匹配的错误类型，
//! 风格上对齐 `spark-core::error::CoreError`——稳定的错误码 + 人类可读消息 +
//! 可选的底层原因链。
//!
//! # 逻辑解析（How）
//! `ErrorKind` 承载六种稳定语义；`EndpointError` 包一层消息与可选的
//! `source`，`Ll`/`Filter` 两个变体专门装箱底层错误，保留
//! `std::error::Error` 的 `source()` 链路以便诊断。
//!
//! # 契约说明（What）
//! `InProgress` 与 `Retry` 仅供内核内部状态机使用，不会从公开 API
//! （`open`/`close`/`write`/`free`/`ref`）中返回给调用方；公开面只会看到
//! `BadEndpoint`、`Busy`、`Communication`、`NoMemory` 或透传的 `Ll`/`Filter`。
use std::fmt;

/// 稳定错误码，供日志与指标按 `kind()` 分桶。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// 操作在当前状态下不合法（例如非 `Open` 时 `write`）。
    BadEndpoint,
    /// 重复的生命周期请求（例如已在 `open` 过程中再次 `open`）。
    Busy,
    /// LL 不可恢复失败。
    Communication,
    /// 内部专用：指示调用将异步完成，绝不会穿透到公开 API。
    InProgress,
    /// 内部专用：驱动定时器重新 arm 的握手重试信号。
    Retry,
    /// 构造期分配失败。
    NoMemory,
}

impl ErrorKind {
    /// 返回适合日志/指标使用的稳定字符串标签。
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadEndpoint => "bad_endpoint",
            ErrorKind::Busy => "busy",
            ErrorKind::Communication => "communication",
            ErrorKind::InProgress => "in_progress",
            ErrorKind::Retry => "retry",
            ErrorKind::NoMemory => "no_memory",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 端点层面的统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// 核心状态机产生的错误，不涉及 LL/Filter 的具体原因。
    #[error("{kind}: {message}")]
    Core {
        kind: ErrorKind,
        message: &'static str,
    },
    /// LL 层透传的错误（例如 `write`/`open`/`close` 返回的非零 errno）。
    #[error("ll error: {0}")]
    Ll(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// Filter 层透传的错误（例如握手失败、证书校验失败）。
    #[error("filter error: {0}")]
    Filter(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl EndpointError {
    pub const fn bad_endpoint(message: &'static str) -> Self {
        EndpointError::Core {
            kind: ErrorKind::BadEndpoint,
            message,
        }
    }

    pub const fn busy(message: &'static str) -> Self {
        EndpointError::Core {
            kind: ErrorKind::Busy,
            message,
        }
    }

    pub const fn communication(message: &'static str) -> Self {
        EndpointError::Core {
            kind: ErrorKind::Communication,
            message,
        }
    }

    pub const fn no_memory(message: &'static str) -> Self {
        EndpointError::Core {
            kind: ErrorKind::NoMemory,
            message,
        }
    }

    pub fn ll(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EndpointError::Ll(Box::new(source))
    }

    pub fn filter(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EndpointError::Filter(Box::new(source))
    }

    /// 返回稳定错误码；`Ll`/`Filter` 透传变体归类为 `Communication`。
    pub fn kind(&self) -> ErrorKind {
        match self {
            EndpointError::Core { kind, .. } => *kind,
            EndpointError::Ll(_) | EndpointError::Filter(_) => ErrorKind::Communication,
        }
    }
}
