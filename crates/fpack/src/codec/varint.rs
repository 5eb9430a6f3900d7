//! LEB128 变长整数与 zigzag 映射。
//!
//! 无符号形式按 7 位一组由低到高输出，除最后一字节外均置续位；
//! 有符号形式先经 zigzag 映射，使小幅值负数仍保持紧凑。

/// `u64` 的最大编码长度。
pub(crate) const MAX_LEN: usize = 10;

/// zigzag 映射：`0, -1, 1, -2, ...` → `0, 1, 2, 3, ...`。
#[inline]
pub(crate) const fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// zigzag 逆映射。
#[inline]
pub(crate) const fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// 编码 `value` 所需的字节数。
#[inline]
pub(crate) const fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// 写入 `value`，返回写入字节数；调用方保证 `dst` 至少有 [`encoded_len`] 字节。
#[inline]
pub(crate) fn put(dst: &mut [u8], mut value: u64) -> usize {
    let mut index = 0;
    while value >= 0x80 {
        dst[index] = (value as u8) | 0x80;
        value >>= 7;
        index += 1;
    }
    dst[index] = value as u8;
    index + 1
}

/// 变长整数读取失败的原因。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum VarintError {
    /// 输入在终止字节之前结束。
    Truncated,
    /// 数值超过 64 位。
    Overflow,
}

/// 读取一个无符号变长整数，返回 `(数值, 消费字节数)`。
pub(crate) fn get(src: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (index, &byte) in src.iter().enumerate() {
        // 第 10 字节只剩 1 位有效位。
        if index == MAX_LEN - 1 && byte > 1 {
            return Err(VarintError::Overflow);
        }
        if byte < 0x80 {
            return Ok((value | (u64::from(byte) << shift), index + 1));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    Err(VarintError::Truncated)
}
