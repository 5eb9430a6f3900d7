use std::borrow::Cow;

use crate::{arena::Arena, error::FpackError};

use super::{ByteOrder, check_size, varint};

/// `Decoder` 是解码回调使用的读游标，与 [`Encoder`](super::Encoder) 的原语一一对称。
///
/// # 教案式说明
/// - **意图 (Why)**：让多字段解码写成平铺的顺序代码，结构错误只在末尾暴露一次；
/// - **执行逻辑 (How)**：
///   1. 每个原语先检查粘性错误，已出错则返回零值/空值且不移动游标；
///   2. 定长原语按当前字节序解析，变长原语按 LEB128 解析；
///   3. 变长字段读取接受 `clone` 标志：为假时借用输入，为真时复制到竞技场
///      （若已通过 [`Decoder::use_arena`] 挂载）或系统堆；
/// - **契约 (What)**：
///   - 借用结果的生命周期为 `'a`，即输入字节与挂载竞技场的公共生命周期，
///     借用检查器保证结果不会活过二者；
///   - 字符串字段必须为合法 UTF-8，否则记录 [`FpackError::InvalidUtf8`]；
///   - 分隔符字段取首次出现的分隔符之前的全部字节，载荷内的分隔符会导致提前截断。
/// - **风险 (Trade-offs)**：非线程安全；`reset` 保留挂载的竞技场。
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
    initial_order: ByteOrder,
    error: Option<FpackError>,
    arena: Option<&'a Arena>,
}

impl<'a> Decoder<'a> {
    /// 以大端字节序包装 `buf`。
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_byte_order(buf, ByteOrder::default())
    }

    /// 包装 `buf` 并指定初始字节序。
    pub fn with_byte_order(buf: &'a [u8], order: ByteOrder) -> Self {
        Self {
            buf,
            pos: 0,
            order,
            initial_order: order,
            error: None,
            arena: None,
        }
    }

    /// 切换到新的输入：游标、错误与字节序复位，竞技场保留。
    pub fn reset(&mut self, buf: &'a [u8]) {
        self.buf = buf;
        self.pos = 0;
        self.order = self.initial_order;
        self.error = None;
    }

    /// 挂载竞技场，此后 `clone = true` 的读取都复制到竞技场中。
    pub fn use_arena(&mut self, arena: &'a Arena) {
        self.arena = Some(arena);
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn use_little_endian(&mut self) {
        self.order = ByteOrder::LittleEndian;
    }

    /// 是否仍有未读字节。
    pub fn remaining(&self) -> bool {
        self.pos < self.buf.len()
    }

    /// 未读字节数。
    pub fn length(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn error(&self) -> Option<FpackError> {
        self.error
    }

    /// 先返回粘性错误，其次检查输入是否被完全消费。
    pub(crate) fn finish(&self) -> Result<(), FpackError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.remaining() {
            return Err(FpackError::RemainingBytes);
        }
        Ok(())
    }

    fn fail(&mut self, err: FpackError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// 切出接下来的 `n` 字节并推进游标。
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.error.is_some() {
            return None;
        }
        if self.length() < n {
            self.fail(FpackError::BufferTooShort);
            return None;
        }
        let buf: &'a [u8] = self.buf;
        let out = &buf[self.pos..self.pos + n];
        self.pos += n;
        Some(out)
    }

    fn get_fixed(&mut self, size: usize) -> u64 {
        let order = self.order;
        self.take(size).map_or(0, |src| order.get(src))
    }

    fn emit(&self, src: &'a [u8], clone: bool) -> Cow<'a, [u8]> {
        match (clone, self.arena) {
            (false, _) => Cow::Borrowed(src),
            (true, Some(arena)) => Cow::Borrowed(arena.clone_slice(src)),
            (true, None) => Cow::Owned(src.to_vec()),
        }
    }

    fn emit_str(&mut self, src: Option<&'a [u8]>, clone: bool) -> Cow<'a, str> {
        let Some(src) = src else {
            return Cow::Borrowed("");
        };
        let Ok(text) = core::str::from_utf8(src) else {
            self.fail(FpackError::InvalidUtf8);
            return Cow::Borrowed("");
        };
        match (clone, self.arena) {
            (false, _) => Cow::Borrowed(text),
            (true, Some(arena)) => Cow::Borrowed(arena.clone_str(text)),
            (true, None) => Cow::Owned(text.to_owned()),
        }
    }

    /// 跳过 `num` 字节，不做检查。
    pub fn skip(&mut self, num: usize) {
        self.take(num);
    }

    /// 仅当字节为 1 时为真。
    pub fn bool(&mut self) -> bool {
        self.uint8() == 1
    }

    pub fn int8(&mut self) -> i8 {
        self.get_fixed(1) as u8 as i8
    }

    pub fn int16(&mut self) -> i16 {
        self.get_fixed(2) as u16 as i16
    }

    pub fn int32(&mut self) -> i32 {
        self.get_fixed(4) as u32 as i32
    }

    pub fn int64(&mut self) -> i64 {
        self.get_fixed(8) as i64
    }

    /// 读取 `size` 字节的有符号整数并做符号扩展。
    pub fn int(&mut self, size: usize) -> i64 {
        if self.error.is_some() {
            return 0;
        }
        if let Err(err) = check_size(size) {
            self.fail(err);
            return 0;
        }
        match size {
            1 => i64::from(self.int8()),
            2 => i64::from(self.int16()),
            4 => i64::from(self.int32()),
            _ => self.int64(),
        }
    }

    pub fn uint8(&mut self) -> u8 {
        self.get_fixed(1) as u8
    }

    pub fn uint16(&mut self) -> u16 {
        self.get_fixed(2) as u16
    }

    pub fn uint32(&mut self) -> u32 {
        self.get_fixed(4) as u32
    }

    pub fn uint64(&mut self) -> u64 {
        self.get_fixed(8)
    }

    /// 读取 `size` 字节的无符号整数。
    pub fn uint(&mut self, size: usize) -> u64 {
        if self.error.is_some() {
            return 0;
        }
        if let Err(err) = check_size(size) {
            self.fail(err);
            return 0;
        }
        self.get_fixed(size)
    }

    pub fn float32(&mut self) -> f32 {
        f32::from_bits(self.uint32())
    }

    pub fn float64(&mut self) -> f64 {
        f64::from_bits(self.uint64())
    }

    /// zigzag + LEB128 有符号变长整数。
    pub fn var_int(&mut self) -> i64 {
        varint::unzigzag(self.var_uint())
    }

    /// LEB128 无符号变长整数；截断记为 `BufferTooShort`，超过 64 位记为 `NumberOverflow`。
    pub fn var_uint(&mut self) -> u64 {
        if self.error.is_some() {
            return 0;
        }
        match varint::get(&self.buf[self.pos..]) {
            Ok((value, read)) => {
                self.pos += read;
                value
            }
            Err(varint::VarintError::Truncated) => {
                self.fail(FpackError::BufferTooShort);
                0
            }
            Err(varint::VarintError::Overflow) => {
                self.fail(FpackError::NumberOverflow { size: 8 });
                0
            }
        }
    }

    /// 长度前缀转为 `usize`；无法表示时输入必然不足。
    fn prefixed(&mut self, len: u64) -> Option<&'a [u8]> {
        if self.error.is_some() {
            return None;
        }
        match usize::try_from(len) {
            Ok(len) => self.take(len),
            Err(_) => {
                self.fail(FpackError::BufferTooShort);
                None
            }
        }
    }

    /// 读取恰好 `length` 字节的字符串，无前缀。
    pub fn string(&mut self, length: usize, clone: bool) -> Cow<'a, str> {
        let src = self.take(length);
        self.emit_str(src, clone)
    }

    /// 读取恰好 `length` 字节，无前缀。
    pub fn bytes(&mut self, length: usize, clone: bool) -> Cow<'a, [u8]> {
        match self.take(length) {
            Some(src) => self.emit(src, clone),
            None => Cow::Borrowed(&[]),
        }
    }

    /// `len_size` 字节长度前缀 + 字符串。
    pub fn fix_string(&mut self, len_size: usize, clone: bool) -> Cow<'a, str> {
        let len = self.uint(len_size);
        let src = self.prefixed(len);
        self.emit_str(src, clone)
    }

    /// `len_size` 字节长度前缀 + 字节。
    pub fn fix_bytes(&mut self, len_size: usize, clone: bool) -> Cow<'a, [u8]> {
        let len = self.uint(len_size);
        match self.prefixed(len) {
            Some(src) => self.emit(src, clone),
            None => Cow::Borrowed(&[]),
        }
    }

    /// 变长整数长度前缀 + 字符串。
    pub fn var_string(&mut self, clone: bool) -> Cow<'a, str> {
        let len = self.var_uint();
        let src = self.prefixed(len);
        self.emit_str(src, clone)
    }

    /// 变长整数长度前缀 + 字节。
    pub fn var_bytes(&mut self, clone: bool) -> Cow<'a, [u8]> {
        let len = self.var_uint();
        match self.prefixed(len) {
            Some(src) => self.emit(src, clone),
            None => Cow::Borrowed(&[]),
        }
    }

    /// 读取到首个 `delim` 为止的字符串，并消费分隔符。
    pub fn del_string(&mut self, delim: &str, clone: bool) -> Cow<'a, str> {
        let src = self.delimited(delim.as_bytes());
        self.emit_str(src, clone)
    }

    /// 读取到首个 `delim` 为止的字节，并消费分隔符。
    ///
    /// 分隔符为空时记录 [`FpackError::EmptyDelimiter`]，找不到分隔符时记录
    /// [`FpackError::BufferTooShort`]。
    pub fn del_bytes(&mut self, delim: &[u8], clone: bool) -> Cow<'a, [u8]> {
        match self.delimited(delim) {
            Some(src) => self.emit(src, clone),
            None => Cow::Borrowed(&[]),
        }
    }

    fn delimited(&mut self, delim: &[u8]) -> Option<&'a [u8]> {
        if self.error.is_some() {
            return None;
        }
        if delim.is_empty() {
            self.fail(FpackError::EmptyDelimiter);
            return None;
        }
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        let Some(index) = rest.windows(delim.len()).position(|window| window == delim) else {
            self.fail(FpackError::BufferTooShort);
            return None;
        };
        self.pos += index + delim.len();
        Some(&rest[..index])
    }

    /// 读取全部剩余字节。
    pub fn tail(&mut self, clone: bool) -> Cow<'a, [u8]> {
        let length = self.length();
        self.bytes(length, clone)
    }
}
