//! 函数式二进制编解码。
//!
//! # 模块定位（Why）
//! - 调用方以一个回调描述字段序列，编码驱动先以“计数模式”运行回调得到精确长度，
//!   再租借恰好等长的目的缓冲并以“写入模式”重放同一回调；
//! - 解码驱动对调用方提供的字节运行一次回调，并在结束后校验输入被完全消费。
//!
//! # 设计概要（How）
//! - [`Encoder`] / [`Decoder`] 均携带粘性错误槽：首个原语错误之后的所有原语都是空操作，
//!   多字段读写可以写成平铺代码，最后只暴露一个终止错误；
//! - 回调自身返回的错误立即短路，跳过粘性错误与剩余字节检查；
//! - 回调错误类型泛化为 `E: From<FpackError>`，调用方可以直接沿用自己的错误域。
//!
//! # 契约说明（What）
//! - 编码回调必须在两遍之间保持确定性且无副作用，否则产出的缓冲不一致，属于用法错误；
//! - 线格式：定长整数按配置的字节序（默认大端），变长整数为 LEB128（有符号先 zigzag），
//!   长度前缀紧跟载荷，无填充、无对齐、无头部与校验。

mod decoder;
mod encoder;
mod varint;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    arena::Arena,
    error::FpackError,
    pool::{Pool, Ref},
};

pub use decoder::Decoder;
pub use encoder::Encoder;

/// 定长多字节整数的字节序；不影响变长整数。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    /// 大端（网络序），默认值。
    #[default]
    BigEndian,
    /// 小端。
    LittleEndian,
}

impl ByteOrder {
    /// 把 `value` 的低 `dst.len()` 字节写入 `dst`；`dst.len()` 必须为 1/2/4/8。
    #[inline]
    pub(crate) fn put(self, dst: &mut [u8], value: u64) {
        match (dst.len(), self) {
            (1, _) => dst[0] = value as u8,
            (2, ByteOrder::BigEndian) => dst.copy_from_slice(&(value as u16).to_be_bytes()),
            (2, ByteOrder::LittleEndian) => dst.copy_from_slice(&(value as u16).to_le_bytes()),
            (4, ByteOrder::BigEndian) => dst.copy_from_slice(&(value as u32).to_be_bytes()),
            (4, ByteOrder::LittleEndian) => dst.copy_from_slice(&(value as u32).to_le_bytes()),
            (8, ByteOrder::BigEndian) => dst.copy_from_slice(&value.to_be_bytes()),
            (8, ByteOrder::LittleEndian) => dst.copy_from_slice(&value.to_le_bytes()),
            (len, _) => unreachable!("unsupported fixed width {len}"),
        }
    }

    /// 按字节序读取 `src`（1/2/4/8 字节）为无符号整数。
    #[inline]
    pub(crate) fn get(self, src: &[u8]) -> u64 {
        match (src.len(), self) {
            (1, _) => u64::from(src[0]),
            (2, ByteOrder::BigEndian) => u64::from(u16::from_be_bytes([src[0], src[1]])),
            (2, ByteOrder::LittleEndian) => u64::from(u16::from_le_bytes([src[0], src[1]])),
            (4, order) => {
                let bytes = [src[0], src[1], src[2], src[3]];
                u64::from(match order {
                    ByteOrder::BigEndian => u32::from_be_bytes(bytes),
                    ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
                })
            }
            (8, order) => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(src);
                match order {
                    ByteOrder::BigEndian => u64::from_be_bytes(bytes),
                    ByteOrder::LittleEndian => u64::from_le_bytes(bytes),
                }
            }
            (len, _) => unreachable!("unsupported fixed width {len}"),
        }
    }
}

/// 校验通用整数宽度。
#[inline]
pub(crate) fn check_size(size: usize) -> Result<(), FpackError> {
    match size {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(FpackError::InvalidSize { size }),
    }
}

/// 两遍编码，目的缓冲来自 `pool`；`pool` 为 `None` 时使用系统分配器。
///
/// # 执行逻辑 (How)
/// 1. 计数模式运行 `f`，回调错误或粘性错误立即返回，不做任何分配；
/// 2. 租借恰为计数长度的目的缓冲；
/// 3. 将同一编码器复位为写入模式并重放 `f`；
/// 4. 第二遍失败（或写入长度与计数不符）时释放目的缓冲并返回错误。
///
/// # 契约 (What)
/// - 成功时返回的 [`Ref`] 长度等于计数长度，调用方负责释放；
/// - 写入不足计数长度时返回 [`FpackError::RemainingBytes`]，不会暴露未写入的池内存；
/// - 两遍都从大端开始；需要其它初始字节序时使用
///   [`FpackConfig::encode`](crate::FpackConfig::encode)。
pub fn encode<F, E>(pool: Option<&Pool>, f: F) -> Result<Ref, E>
where
    F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
    E: From<FpackError>,
{
    encode_ordered(ByteOrder::default(), pool, f)
}

pub(crate) fn encode_ordered<F, E>(order: ByteOrder, pool: Option<&Pool>, mut f: F) -> Result<Ref, E>
where
    F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
    E: From<FpackError>,
{
    let mut counter = Encoder::with_byte_order(order);
    f(&mut counter)?;
    counter.finish().map_err(E::from)?;
    let length = counter.length();

    let mut dst = match pool {
        Some(pool) => pool.borrow(length, false),
        None => Ref::unpooled(vec![0u8; length]),
    };

    let outcome = {
        let mut writer = counter.rewind(&mut dst);
        match f(&mut writer) {
            Ok(()) => writer.finish_exact(length).map_err(E::from),
            Err(err) => Err(err),
        }
    };

    match outcome {
        Ok(()) => Ok(dst),
        Err(err) => {
            debug!(length, "encode write pass failed, releasing destination");
            dst.release();
            Err(err)
        }
    }
}

/// 两遍编码到调用方提供的切片，返回写入字节数。
///
/// 计数长度超过 `dst.len()` 时返回 [`FpackError::BufferTooShort`]，不写入任何字节。
pub fn encode_into<F, E>(dst: &mut [u8], f: F) -> Result<usize, E>
where
    F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
    E: From<FpackError>,
{
    encode_into_ordered(ByteOrder::default(), dst, f)
}

pub(crate) fn encode_into_ordered<F, E>(order: ByteOrder, dst: &mut [u8], mut f: F) -> Result<usize, E>
where
    F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
    E: From<FpackError>,
{
    let mut counter = Encoder::with_byte_order(order);
    f(&mut counter)?;
    counter.finish().map_err(E::from)?;
    let length = counter.length();
    if dst.len() < length {
        return Err(FpackError::BufferTooShort.into());
    }

    let mut writer = counter.rewind(&mut dst[..length]);
    f(&mut writer)?;
    writer.finish_exact(length).map_err(E::from)?;
    Ok(length)
}

/// 两遍编码，目的缓冲取自竞技场；返回的切片与竞技场同寿。
///
/// 第二遍失败时分片无法单独归还，随竞技场整体释放。
pub fn encode_in_arena<'r, F, E>(arena: &'r Arena, f: F) -> Result<&'r [u8], E>
where
    F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
    E: From<FpackError>,
{
    encode_in_arena_ordered(ByteOrder::default(), arena, f)
}

pub(crate) fn encode_in_arena_ordered<'r, F, E>(
    order: ByteOrder,
    arena: &'r Arena,
    mut f: F,
) -> Result<&'r [u8], E>
where
    F: FnMut(&mut Encoder<'_>) -> Result<(), E>,
    E: From<FpackError>,
{
    let mut counter = Encoder::with_byte_order(order);
    f(&mut counter)?;
    counter.finish().map_err(E::from)?;
    let length = counter.length();

    let dst = arena.get(length, false);
    let mut writer = counter.rewind(&mut *dst);
    f(&mut writer)?;
    writer.finish_exact(length).map_err(E::from)?;
    Ok(dst)
}

/// 无错误通道的编码便捷入口。
pub fn encode_plain<F>(pool: Option<&Pool>, mut f: F) -> Result<Ref, FpackError>
where
    F: FnMut(&mut Encoder<'_>),
{
    encode(pool, |enc: &mut Encoder<'_>| {
        f(enc);
        Ok::<(), FpackError>(())
    })
}

/// 解码：对 `bytes` 运行一次回调。
///
/// # 契约 (What)
/// - 回调返回错误时原样返回，跳过后续检查；
/// - 否则先返回粘性错误；若无错误但仍有未读字节，返回 [`FpackError::RemainingBytes`]。
pub fn decode<'a, F, E>(bytes: &'a [u8], f: F) -> Result<(), E>
where
    F: FnOnce(&mut Decoder<'a>) -> Result<(), E>,
    E: From<FpackError>,
{
    decode_ordered(ByteOrder::default(), bytes, f)
}

pub(crate) fn decode_ordered<'a, F, E>(order: ByteOrder, bytes: &'a [u8], f: F) -> Result<(), E>
where
    F: FnOnce(&mut Decoder<'a>) -> Result<(), E>,
    E: From<FpackError>,
{
    let mut dec = Decoder::with_byte_order(bytes, order);
    f(&mut dec)?;
    dec.finish().map_err(E::from)
}

/// 无错误通道的解码便捷入口。
pub fn decode_plain<'a, F>(bytes: &'a [u8], f: F) -> Result<(), FpackError>
where
    F: FnOnce(&mut Decoder<'a>),
{
    let mut dec = Decoder::new(bytes);
    f(&mut dec);
    dec.finish()
}
