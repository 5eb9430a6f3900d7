//! 运行时配置：字节序、竞技场分片与缓冲分块尺寸、泄漏回溯开关。
//!
//! 配置本身不持有资源，只负责校验并构造 [`Arena`] / [`Buffer`]，
//! 以及按配置的字节序驱动两遍编码与解码；
//! 反序列化字段使用 kebab-case，缺省字段回落到 [`FpackConfig::default`]。

use serde::{Deserialize, Serialize};

use crate::{
    arena::Arena,
    buffer::Buffer,
    codec::{
        ByteOrder, Decoder, Encoder, decode_ordered, encode_in_arena_ordered,
        encode_into_ordered, encode_ordered,
    },
    error::{FpackError, Result},
    pool::{Pool, Ref, set_backtrace_capture},
};

/// 竞技场分片缺省尺寸（64 KiB）。
pub const DEFAULT_ARENA_FRAGMENT_SIZE: usize = 64 << 10;

/// 缓冲分块缺省尺寸（4 KiB）。
pub const DEFAULT_BUFFER_CHUNK_SIZE: usize = 4 << 10;

/// fpack 配置。
///
/// # 教案式说明
/// - **意图 (Why)**：把散落在构造参数里的尺寸与字节序集中为一份可序列化的配置，
///   便于从配置文件统一下发；
/// - **契约 (What)**：使用前调用 [`FpackConfig::validate`]，`arena`/`buffer`
///   构造器内部也会校验，非法尺寸返回 [`FpackError::InvalidConfig`]。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FpackConfig {
    pub byte_order: ByteOrder,
    pub arena_fragment_size: usize,
    pub buffer_chunk_size: usize,
    pub capture_leak_backtraces: bool,
}

impl Default for FpackConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::BigEndian,
            arena_fragment_size: DEFAULT_ARENA_FRAGMENT_SIZE,
            buffer_chunk_size: DEFAULT_BUFFER_CHUNK_SIZE,
            capture_leak_backtraces: false,
        }
    }
}

impl FpackConfig {
    /// 校验尺寸字段。
    pub fn validate(&self) -> Result<()> {
        if self.arena_fragment_size == 0 {
            return Err(FpackError::InvalidConfig {
                field: "arena-fragment-size",
                reason: "must be greater than zero",
            });
        }
        if self.buffer_chunk_size == 0 {
            return Err(FpackError::InvalidConfig {
                field: "buffer-chunk-size",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// 按配置的分片尺寸创建竞技场。
    pub fn arena(&self, pool: &Pool) -> Result<Arena> {
        self.validate()?;
        Ok(Arena::new(pool, self.arena_fragment_size))
    }

    /// 按配置的分块尺寸创建缓冲。
    pub fn buffer(&self, pool: &Pool) -> Result<Buffer> {
        self.validate()?;
        Ok(Buffer::new(pool, self.buffer_chunk_size))
    }

    /// 与 [`crate::encode`] 相同，但两遍都从配置的字节序开始。
    ///
    /// 回调内切换字节序只影响当前这一遍；写入遍开始时恢复为配置值。
    pub fn encode<F, E>(&self, pool: Option<&Pool>, f: F) -> Result<Ref, E>
    where
        F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
        E: From<FpackError>,
    {
        encode_ordered(self.byte_order, pool, f)
    }

    /// 与 [`crate::encode_into`] 相同，使用配置的字节序。
    pub fn encode_into<F, E>(&self, dst: &mut [u8], f: F) -> Result<usize, E>
    where
        F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
        E: From<FpackError>,
    {
        encode_into_ordered(self.byte_order, dst, f)
    }

    /// 与 [`crate::encode_in_arena`] 相同，使用配置的字节序。
    pub fn encode_in_arena<'r, F, E>(&self, arena: &'r Arena, f: F) -> Result<&'r [u8], E>
    where
        F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
        E: From<FpackError>,
    {
        encode_in_arena_ordered(self.byte_order, arena, f)
    }

    /// 与 [`crate::decode`] 相同，使用配置的字节序。
    pub fn decode<'a, F, E>(&self, bytes: &'a [u8], f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Decoder<'a>) -> Result<(), E>,
        E: From<FpackError>,
    {
        decode_ordered(self.byte_order, bytes, f)
    }

    /// 以配置的字节序包装输入，供不经驱动的手动解码使用。
    pub fn decoder<'a>(&self, bytes: &'a [u8]) -> Decoder<'a> {
        Decoder::with_byte_order(bytes, self.byte_order)
    }

    /// 把泄漏回溯开关应用到进程级追踪器。
    pub fn apply_leak_capture(&self) {
        set_backtrace_capture(self.capture_leak_backtraces);
    }
}
