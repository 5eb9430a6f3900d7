//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为编解码、内存池、分块缓冲提供统一的错误语义，调用方只需匹配一个枚举即可区分
//!   “输入数据结构不合法”与“调用方用法错误”；
//! - 编解码原语把错误写入粘性错误槽（sticky error），因此错误类型必须可克隆、可比较。
//!
//! ## 设计要求（What）
//! - 所有变体实现 `thiserror::Error`，兼容 `std::error::Error` 与 `?` 传播；
//! - 代际不匹配（重复释放 / 释放后复用）**不是**可返回的错误值，而是通过
//!   [`generation_mismatch`] 直接 panic，因为它意味着两段无关所有权共享了同一块内存。
//!
//! ## 扩展建议（How）
//! - 新增变体时同步更新 `From<FpackError> for std::io::Error` 的映射，保持 `Buffer`
//!   的 `std::io` 适配层语义稳定。

use std::io;

use thiserror::Error;

/// crate 统一的结果别名。
pub type Result<T, E = FpackError> = core::result::Result<T, E>;

/// fpack 错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：覆盖编解码原语、缓冲寻址与配置校验的全部可恢复失败；
/// - **契约 (What)**：
///   - 变体均为 `Send + Sync + 'static`，可跨线程传播；
///   - `Clone + Eq` 使粘性错误槽可以直接比较，测试中无需字符串匹配；
/// - **设计权衡 (Trade-offs)**：携带的上下文全部为定长数值或 `&'static str`，
///   保证在零分配热路径上构造错误本身也不触发堆分配。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum FpackError {
    /// 目标缓冲或输入字节在操作完成前耗尽。
    #[error("buffer too short")]
    BufferTooShort,

    /// 解码回调执行完毕，但输入尚未被完全消费。
    ///
    /// 与结构性失败区分：数据格式正确，只是调用方多提供了字节。
    #[error("remaining bytes")]
    RemainingBytes,

    /// 通用整数读写的宽度不在 `{1, 2, 4, 8}` 之内。
    #[error("invalid size: {size}")]
    InvalidSize { size: usize },

    /// 数值无法放入请求的宽度（定长整数，或超过 64 位的变长整数）。
    #[error("number overflow: value does not fit into {size} byte(s)")]
    NumberOverflow { size: usize },

    /// 分隔符字段使用了空分隔符。
    #[error("empty delimiter")]
    EmptyDelimiter,

    /// 寻址计算得到负偏移或溢出。
    #[error("invalid offset")]
    InvalidOffset,

    /// 在当前长度或之后读取缓冲。
    #[error("end of data")]
    EndOfData,

    /// 解码得到的字符串不是合法 UTF-8。
    #[error("invalid utf-8")]
    InvalidUtf8,

    /// 配置字段不满足约束。
    #[error("invalid config `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
}

impl From<FpackError> for io::Error {
    fn from(err: FpackError) -> Self {
        let kind = match err {
            FpackError::EndOfData => io::ErrorKind::UnexpectedEof,
            FpackError::BufferTooShort => io::ErrorKind::UnexpectedEof,
            FpackError::InvalidOffset
            | FpackError::InvalidSize { .. }
            | FpackError::InvalidConfig { .. } => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

/// 代际不匹配：`Ref` 被重复释放，或在描述符被重新借出后释放。
///
/// # 契约 (What)
/// - 永不返回；调用即 panic，消息固定为 `fpack: generation mismatch`；
/// - 继续执行会让两个无关持有者别名同一块内存，因此不能降级为错误值。
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn generation_mismatch() -> ! {
    panic!("fpack: generation mismatch")
}
