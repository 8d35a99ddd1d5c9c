//! 错误类型定义
//!
//! 提供块缓存操作的错误类型。
//!
//! 缓存内部不做任何恢复或重试：这里能出现的每一种错误，要么是容量规划
//! 失败（[`ErrorKind::ResourceExhausted`]），要么是底层设备故障
//! （[`ErrorKind::Io`]），调用方应当将其视为致命错误。调用方违反使用
//! 契约（未持有排他锁就释放/提交）不走 `Result` 通道，而是直接 panic。

use core::fmt;

/// 缓存操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 设备 I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 缓冲池耗尽：所有缓冲区都被引用，没有可驱逐的受害者
    ResourceExhausted,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
