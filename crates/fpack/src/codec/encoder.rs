use crate::error::FpackError;

use super::{ByteOrder, check_size, varint};

/// 编码器的两种模式，显式建模为状态机。
#[derive(Debug)]
enum Mode<'b> {
    /// 无目的缓冲，只累计长度。
    Counting,
    /// 写入目的缓冲，`pos` 为下一个写入位置。
    Writing { dst: &'b mut [u8], pos: usize },
}

/// `Encoder` 是两遍编码中被回调驱动的写游标。
///
/// # 教案式说明
/// - **意图 (Why)**：同一组原语在计数模式下只累加“将要写入的精确字节数”（例如变长整数的
///   真实长度而非最坏情况），在写入模式下落盘，从而保证两遍结果严格一致；
/// - **执行逻辑 (How)**：所有原语最终经由 `reserve` 申请空间：计数模式只推进长度，
///   写入模式切出目的缓冲的下一段；任何失败写入粘性错误槽，之后的原语全部变为空操作；
/// - **契约 (What)**：
///   - 字节序切换只影响其后的定长多字节原语；
///   - `int`/`uint` 的宽度必须为 1/2/4/8，1/2/4 字节宽度做范围检查，8 字节不检查；
///   - 计数模式同样执行宽度、范围与分隔符校验，保证错误在分配之前暴露。
/// - **风险 (Trade-offs)**：非线程安全，每个编码过程独占一个实例。
#[derive(Debug)]
pub struct Encoder<'b> {
    mode: Mode<'b>,
    length: usize,
    order: ByteOrder,
    initial_order: ByteOrder,
    error: Option<FpackError>,
}

impl Default for Encoder<'_> {
    fn default() -> Self {
        Self::with_byte_order(ByteOrder::default())
    }
}

impl<'b> Encoder<'b> {
    /// 创建计数模式编码器（大端）。
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建计数模式编码器，并指定初始字节序。
    pub fn with_byte_order(order: ByteOrder) -> Self {
        Self {
            mode: Mode::Counting,
            length: 0,
            order,
            initial_order: order,
            error: None,
        }
    }

    /// 创建直接写入 `dst` 的编码器。
    pub fn writing(dst: &'b mut [u8]) -> Self {
        Self {
            mode: Mode::Writing { dst, pos: 0 },
            ..Self::default()
        }
    }

    /// 复位为写入模式：清空长度与错误，字节序恢复为初始值。
    pub fn rewind<'c>(self, dst: &'c mut [u8]) -> Encoder<'c> {
        Encoder {
            mode: Mode::Writing { dst, pos: 0 },
            length: 0,
            order: self.initial_order,
            initial_order: self.initial_order,
            error: None,
        }
    }

    /// 是否处于计数模式。
    pub fn counting(&self) -> bool {
        matches!(self.mode, Mode::Counting)
    }

    /// 计数模式下为累计长度，写入模式下为已写入字节数。
    pub fn length(&self) -> usize {
        self.length
    }

    /// 当前粘性错误。
    pub fn error(&self) -> Option<FpackError> {
        self.error
    }

    /// 当前字节序。
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// 切换字节序，影响其后的定长多字节原语。
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// 切换为小端。
    pub fn use_little_endian(&mut self) {
        self.order = ByteOrder::LittleEndian;
    }

    pub(crate) fn finish(&self) -> Result<(), FpackError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn finish_exact(&self, expected: usize) -> Result<(), FpackError> {
        self.finish()?;
        if self.length != expected {
            return Err(FpackError::RemainingBytes);
        }
        Ok(())
    }

    fn fail(&mut self, err: FpackError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// 申请 `n` 字节：计数模式只推进长度并返回 `None`。
    ///
    /// 累计长度超出 `usize` 时记录 [`FpackError::BufferTooShort`]：没有目的缓冲能容纳它。
    fn reserve(&mut self, n: usize) -> Option<&mut [u8]> {
        if self.error.is_some() {
            return None;
        }
        let Some(end) = self.length.checked_add(n) else {
            self.fail(FpackError::BufferTooShort);
            return None;
        };
        match &mut self.mode {
            Mode::Counting => {
                self.length = end;
                None
            }
            Mode::Writing { dst, pos } => {
                if dst.len() - *pos < n {
                    self.error = Some(FpackError::BufferTooShort);
                    return None;
                }
                let start = *pos;
                *pos += n;
                self.length = end;
                Some(&mut dst[start..start + n])
            }
        }
    }

    fn put_fixed(&mut self, value: u64, size: usize) {
        let order = self.order;
        if let Some(dst) = self.reserve(size) {
            order.put(dst, value);
        }
    }

    /// 写入 `num` 个零字节。
    pub fn skip(&mut self, num: usize) {
        if let Some(dst) = self.reserve(num) {
            dst.fill(0);
        }
    }

    /// 布尔值：1 为真，0 为假。
    pub fn bool(&mut self, yes: bool) {
        self.uint8(u8::from(yes));
    }

    pub fn int8(&mut self, num: i8) {
        self.put_fixed(num as u8 as u64, 1);
    }

    pub fn int16(&mut self, num: i16) {
        self.put_fixed(num as u16 as u64, 2);
    }

    pub fn int32(&mut self, num: i32) {
        self.put_fixed(num as u32 as u64, 4);
    }

    pub fn int64(&mut self, num: i64) {
        self.put_fixed(num as u64, 8);
    }

    /// 以 `size` 字节写入有符号整数（补码）。
    ///
    /// 宽度非法时记录 [`FpackError::InvalidSize`]；1/2/4 字节超出范围时记录
    /// [`FpackError::NumberOverflow`]。
    pub fn int(&mut self, num: i64, size: usize) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = check_size(size) {
            return self.fail(err);
        }
        let fits = match size {
            1 => i8::try_from(num).is_ok(),
            2 => i16::try_from(num).is_ok(),
            4 => i32::try_from(num).is_ok(),
            _ => true,
        };
        if !fits {
            return self.fail(FpackError::NumberOverflow { size });
        }
        self.put_fixed(num as u64, size);
    }

    pub fn uint8(&mut self, num: u8) {
        self.put_fixed(u64::from(num), 1);
    }

    pub fn uint16(&mut self, num: u16) {
        self.put_fixed(u64::from(num), 2);
    }

    pub fn uint32(&mut self, num: u32) {
        self.put_fixed(u64::from(num), 4);
    }

    pub fn uint64(&mut self, num: u64) {
        self.put_fixed(num, 8);
    }

    /// 以 `size` 字节写入无符号整数，校验规则同 [`Encoder::int`]。
    pub fn uint(&mut self, num: u64, size: usize) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = check_size(size) {
            return self.fail(err);
        }
        if size < 8 && num >> (size * 8) != 0 {
            return self.fail(FpackError::NumberOverflow { size });
        }
        self.put_fixed(num, size);
    }

    /// 按位重解释写入 IEEE-754 单精度。
    pub fn float32(&mut self, num: f32) {
        self.uint32(num.to_bits());
    }

    /// 按位重解释写入 IEEE-754 双精度。
    pub fn float64(&mut self, num: f64) {
        self.uint64(num.to_bits());
    }

    /// zigzag + LEB128 有符号变长整数。
    pub fn var_int(&mut self, num: i64) {
        self.var_uint(varint::zigzag(num));
    }

    /// LEB128 无符号变长整数。
    pub fn var_uint(&mut self, num: u64) {
        if let Some(dst) = self.reserve(varint::encoded_len(num)) {
            varint::put(dst, num);
        }
    }

    /// 原样写入字符串，无任何前缀。
    pub fn string(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }

    /// 原样写入字节，无任何前缀。
    pub fn bytes(&mut self, b: &[u8]) {
        if let Some(dst) = self.reserve(b.len()) {
            dst.copy_from_slice(b);
        }
    }

    /// `len_size` 字节长度前缀 + 字符串。
    pub fn fix_string(&mut self, s: &str, len_size: usize) {
        self.fix_bytes(s.as_bytes(), len_size);
    }

    /// `len_size` 字节长度前缀 + 字节。
    pub fn fix_bytes(&mut self, b: &[u8], len_size: usize) {
        self.uint(b.len() as u64, len_size);
        self.bytes(b);
    }

    /// 变长整数长度前缀 + 字符串。
    pub fn var_string(&mut self, s: &str) {
        self.var_bytes(s.as_bytes());
    }

    /// 变长整数长度前缀 + 字节。
    pub fn var_bytes(&mut self, b: &[u8]) {
        self.var_uint(b.len() as u64);
        self.bytes(b);
    }

    /// 字符串 + 分隔符。载荷中的分隔符不做转义。
    pub fn del_string(&mut self, s: &str, delim: &str) {
        self.del_bytes(s.as_bytes(), delim.as_bytes());
    }

    /// 字节 + 分隔符；分隔符为空时记录 [`FpackError::EmptyDelimiter`]。
    pub fn del_bytes(&mut self, b: &[u8], delim: &[u8]) {
        if self.error.is_some() {
            return;
        }
        if delim.is_empty() {
            return self.fail(FpackError::EmptyDelimiter);
        }
        self.bytes(b);
        self.bytes(delim);
    }

    /// 尾部字节，应作为最后一个字段。
    pub fn tail(&mut self, b: &[u8]) {
        self.bytes(b);
    }
}
