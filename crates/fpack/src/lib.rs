//! `fpack` 提供基于分级内存池的零分配二进制编解码层。
//!
//! # 模块定位（Why）
//! - 高吞吐消息路径上，编码目的缓冲、解码字段副本与大块暂存内存都应来自可复用的池，
//!   而不是逐次向系统分配器申请；
//! - 编码采用“先计数、再写入”的两遍算法，目的缓冲长度恰好等于编码结果，无需扩容与拷贝。
//!
//! # 设计概要（How）
//! - [`pool`]：16 级 2 的幂尺寸等级的内存池，以代际令牌检测重复释放与释放后复用；
//! - [`arena`]：在池页上做指针碰撞的批量分配器，一次释放替代 N 次释放；
//! - [`codec`]：[`Encoder`] / [`Decoder`] 原语集与 [`encode`] / [`decode`] 驱动；
//! - [`buffer`]：由池页按需拼接的分块缓冲，支持流式与随机访问；
//! - [`config`]：可序列化的尺寸与字节序配置。
//!
//! # 契约说明（What）
//! - 每个池化 [`Ref`] 必须恰好释放一次；重复释放会以 `fpack: generation mismatch` panic；
//! - [`Pool`] 与 [`Buffer`] 可跨线程共享，[`Arena`]、[`Encoder`]、[`Decoder`] 只供单个调用方使用。
//!
//! ```
//! use fpack::{FpackError, Pool, decode, encode};
//!
//! let pool = Pool::new();
//! let frame = encode(Some(&pool), |enc| {
//!     enc.uint16(42);
//!     enc.var_string("hello");
//!     Ok::<_, FpackError>(())
//! })?;
//! assert_eq!(&frame[..], b"\x00\x2a\x05hello");
//!
//! decode(&frame, |dec| {
//!     assert_eq!(dec.uint16(), 42);
//!     assert_eq!(dec.var_string(false), "hello");
//!     Ok::<_, FpackError>(())
//! })?;
//! frame.release();
//! # Ok::<_, FpackError>(())
//! ```

pub mod arena;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod pool;

pub use arena::Arena;
pub use buffer::Buffer;
pub use codec::{
    ByteOrder, Decoder, Encoder, decode, decode_plain, encode, encode_in_arena, encode_into,
    encode_plain,
};
pub use config::FpackConfig;
pub use error::{FpackError, Result};
pub use pool::{
    ClassStats, LeakReport, LeakTracker, Pool, PoolStats, RawRef, Ref, set_backtrace_capture,
    set_leak_tracker,
};
