//! 分块缓冲：由定长池页按需拼接而成的逻辑字节数组。
//!
//! # 模块定位（Why）
//! - 需要“可增长、可随机访问”的大块内存，又不希望在增长时整体搬迁数据；
//! - 每个分块独立租借自 [`Pool`]，增长只追加分块，已写入数据原地不动。
//!
//! # 契约说明（What）
//! - 所有操作都在同一把互斥锁下串行执行，单个实例可被多个调用方并发使用；
//! - 稀疏写入留下的空洞（旧长度到写入偏移之间）一律显式清零，绝不暴露池页上的残留数据；
//! - `read`/`read_at` 在长度处或之后读取返回 [`FpackError::EndOfData`]，部分越界时截断。

use std::io::{self, SeekFrom};

use parking_lot::Mutex;

use crate::{
    error::{FpackError, Result},
    pool::{Pool, Ref},
};

/// 分块缓冲。
///
/// # 教案式说明
/// - **执行逻辑 (How)**：逻辑偏移 `pos` 位于第 `pos / chunk_size` 个分块的
///   `pos % chunk_size` 处；写入越过当前长度时先补齐分块，再清零空洞，最后逐段复制；
/// - **风险 (Trade-offs)**：一个实例内部没有并行度；[`Buffer::range`] 的回调在持锁期间执行，
///   回调内不得再访问同一个 `Buffer`。
pub struct Buffer {
    pool: Pool,
    chunk_size: usize,
    state: Mutex<BufferState>,
}

struct BufferState {
    offset: usize,
    length: usize,
    chunks: Vec<Ref>,
}

impl Buffer {
    /// 创建空缓冲；分块在首次写入时才租借。
    ///
    /// # Panics
    /// `chunk_size` 为 0 时 panic。
    pub fn new(pool: &Pool, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "buffer chunk size must be non-zero");
        Self {
            pool: pool.clone(),
            chunk_size,
            state: Mutex::new(BufferState {
                offset: 0,
                length: 0,
                chunks: Vec::new(),
            }),
        }
    }

    /// 分块尺寸。
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 逻辑长度。
    pub fn length(&self) -> usize {
        self.state.lock().length
    }

    /// 已租借的分块数量。
    pub fn chunks(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// 当前流游标。
    pub fn position(&self) -> u64 {
        self.state.lock().offset as u64
    }

    /// 移动流游标，返回新位置；结果为负时返回 [`FpackError::InvalidOffset`]。
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let mut state = self.state.lock();
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => (0, i128::from(offset)),
            SeekFrom::Current(delta) => (state.offset, i128::from(delta)),
            SeekFrom::End(delta) => (state.length, i128::from(delta)),
        };
        let target = base as i128 + delta;
        let offset = usize::try_from(target).map_err(|_| FpackError::InvalidOffset)?;
        state.offset = offset;
        Ok(offset as u64)
    }

    /// 在流游标处写入并推进游标。
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let offset = state.offset;
        self.write_locked(&mut state, offset, buf)?;
        state.offset += buf.len();
        Ok(buf.len())
    }

    /// 在 `offset` 处写入，不影响流游标。
    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let offset = usize::try_from(offset).map_err(|_| FpackError::InvalidOffset)?;
        let mut state = self.state.lock();
        self.write_locked(&mut state, offset, buf)?;
        Ok(buf.len())
    }

    /// 在流游标处读取并推进游标。
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let offset = state.offset;
        let read = self.read_locked(&state, offset, buf)?;
        state.offset += read;
        Ok(read)
    }

    /// 在 `offset` 处读取，不影响流游标。
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let offset = usize::try_from(offset).map_err(|_| FpackError::EndOfData)?;
        let state = self.state.lock();
        self.read_locked(&state, offset, buf)
    }

    /// 零拷贝遍历 `[offset, offset + length)` 窗口。
    ///
    /// 每个分块片段调用一次 `f(窗口内相对偏移, 片段视图)`；窗口超出长度的部分被截掉。
    pub fn range<F>(&self, offset: usize, length: usize, mut f: F)
    where
        F: FnMut(usize, &[u8]),
    {
        let state = self.state.lock();
        let end = offset.saturating_add(length).min(state.length);
        for_each_part(&state.chunks, self.chunk_size, offset, end, |loc, part| {
            f(loc, part);
        });
    }

    /// 一次性归还全部分块。
    pub fn release(self) {
        let state = self.state.into_inner();
        for chunk in state.chunks {
            chunk.release();
        }
    }

    fn write_locked(&self, state: &mut BufferState, offset: usize, buf: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(buf.len())
            .ok_or(FpackError::InvalidOffset)?;
        let previous = state.length;
        self.grow(state, end);

        let chunk_size = self.chunk_size;
        for_each_part_mut(&mut state.chunks, chunk_size, previous, offset, |_, part| {
            part.fill(0);
        });
        for_each_part_mut(&mut state.chunks, chunk_size, offset, end, |loc, part| {
            part.copy_from_slice(&buf[loc..loc + part.len()]);
        });
        Ok(())
    }

    fn read_locked(&self, state: &BufferState, offset: usize, buf: &mut [u8]) -> Result<usize> {
        if offset >= state.length {
            return Err(FpackError::EndOfData);
        }
        let available = (state.length - offset).min(buf.len());
        for_each_part(
            &state.chunks,
            self.chunk_size,
            offset,
            offset + available,
            |loc, part| {
                buf[loc..loc + part.len()].copy_from_slice(part);
            },
        );
        Ok(available)
    }

    /// 补齐覆盖 `length` 所需的整数个分块。
    fn grow(&self, state: &mut BufferState, length: usize) {
        if length <= state.length {
            return;
        }
        let needed = length.div_ceil(self.chunk_size);
        while state.chunks.len() < needed {
            state.chunks.push(self.pool.borrow(self.chunk_size, false));
        }
        state.length = length;
    }
}

fn for_each_part<F>(chunks: &[Ref], chunk_size: usize, start: usize, end: usize, mut f: F)
where
    F: FnMut(usize, &[u8]),
{
    let mut pos = start;
    while pos < end {
        let index = pos / chunk_size;
        let within = pos % chunk_size;
        let take = (chunk_size - within).min(end - pos);
        f(pos - start, &chunks[index][within..within + take]);
        pos += take;
    }
}

fn for_each_part_mut<F>(chunks: &mut [Ref], chunk_size: usize, start: usize, end: usize, mut f: F)
where
    F: FnMut(usize, &mut [u8]),
{
    let mut pos = start;
    while pos < end {
        let index = pos / chunk_size;
        let within = pos % chunk_size;
        let take = (chunk_size - within).min(end - pos);
        f(pos - start, &mut chunks[index][within..within + take]);
        pos += take;
    }
}

impl core::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Buffer")
            .field("chunk_size", &self.chunk_size)
            .field("offset", &state.offset)
            .field("length", &state.length)
            .field("chunks", &state.chunks.len())
            .finish()
    }
}

// `std::io` 适配：`EndOfData` 在读取时表现为 0 字节，其余错误转为 `io::Error`。

impl io::Read for &Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Buffer::read(*self, buf) {
            Ok(read) => Ok(read),
            Err(FpackError::EndOfData) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl io::Write for &Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Buffer::write(*self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for &Buffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Buffer::seek(*self, pos).map_err(io::Error::from)
    }
}

impl io::Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for Buffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        io::Seek::seek(&mut &*self, pos)
    }
}
