//! 竞技场分配器：把大量短命的小块租借合并到少数池页上，统一释放。
//!
//! # 模块定位（Why）
//! - 解码一条消息时往往需要克隆许多字段，逐个向池租借/释放会把开销放大 N 倍；
//! - `Arena` 以固定尺寸的分片（fragment）为单位向 [`Pool`] 租借，再在分片内做指针碰撞，
//!   最终以 O(分片数) 次释放替代 N 次释放。
//!
//! # 契约说明（What）
//! - [`Arena::get`] 返回的切片在 [`Arena::release`] / [`Arena::reset`] 之前有效，
//!   不支持逐块释放；借用检查器保证切片不会活过释放调用；
//! - 非线程安全：`Arena` 为 `!Sync`，同一实例只应由单个调用方使用。

use core::{cell::UnsafeCell, fmt, ptr::NonNull};

use crate::pool::{Pool, Ref};

/// 批量分配器。
///
/// # 教案式说明
/// - **意图 (Why)**：为解码路径提供“零逐次释放”的字段克隆目的地；
/// - **执行逻辑 (How)**：
///   1. 请求长度超过分片尺寸时，单独租借一块恰好等长的池缓冲并整体返回；
///   2. 否则当前分片剩余空间不足时租借新分片并重置游标；
///   3. 从当前分片切出 `length` 字节，按需仅清零这段切片，游标前移；
/// - **设计权衡 (Trade-offs)**：分片尾部不足以容纳下一次请求的空间会被浪费，
///   以换取 O(1) 的分配与无锁的单线程实现。
pub struct Arena {
    pool: Pool,
    size: usize,
    state: UnsafeCell<ArenaState>,
}

struct ArenaState {
    cursor: NonNull<u8>,
    remaining: usize,
    length: usize,
    refs: Vec<Ref>,
}

// SAFETY: 分片切片的生命周期绑定在 `&Arena` 上，移动 `Arena` 前所有切片必然已失效；
// `ArenaState` 中的裸指针只指向自身持有的 `Ref` 数据页。
unsafe impl Send for Arena {}

impl Arena {
    /// 使用给定池与分片尺寸创建竞技场。
    ///
    /// 创建本身不租借任何内存，首次 [`Arena::get`] 时才租借分片。
    pub fn new(pool: &Pool, size: usize) -> Self {
        Self {
            pool: pool.clone(),
            size,
            state: UnsafeCell::new(ArenaState {
                cursor: NonNull::dangling(),
                remaining: 0,
                length: 0,
                refs: Vec::new(),
            }),
        }
    }

    /// 分片尺寸。
    pub fn fragment_size(&self) -> usize {
        self.size
    }

    /// 累计请求的字节数。
    pub fn length(&self) -> usize {
        self.state().length
    }

    /// 当前持有的池缓冲数量。
    pub fn chunks(&self) -> usize {
        self.state().refs.len()
    }

    /// 返回长度为 `length` 的切片；`zero` 为真时只清零该切片。
    ///
    /// 长度为 0 时返回空切片，不触发租借。
    #[allow(clippy::mut_from_ref)]
    pub fn get(&self, length: usize, zero: bool) -> &mut [u8] {
        // SAFETY: `Arena` 为 `!Sync` 且本方法不重入，此处是状态的唯一可变访问者。
        let state = unsafe { &mut *self.state.get() };
        state.length += length;

        if length == 0 {
            return &mut [];
        }

        if length > self.size {
            let mut buf = self.pool.borrow(length, zero);
            let ptr = buf.as_mut_ptr();
            state.refs.push(buf);
            // SAFETY: `ptr` 指向刚登记的 `Ref` 的数据页，长度恰为 `length`；
            // 数据页位于堆上，`Ref` 在 `refs` 中移动不会改变其地址，
            // 且该区域不会再被切给其它调用方。
            return unsafe { core::slice::from_raw_parts_mut(ptr, length) };
        }

        if state.remaining < length {
            let mut chunk = self.pool.borrow(self.size, false);
            // SAFETY: 同上，`as_mut_ptr` 取自堆上的数据页，非空。
            state.cursor = unsafe { NonNull::new_unchecked(chunk.as_mut_ptr()) };
            state.remaining = self.size;
            state.refs.push(chunk);
        }

        let start = state.cursor;
        // SAFETY: `length <= remaining`，推进后的游标仍位于当前分片内（或恰在末尾）。
        state.cursor = unsafe { start.add(length) };
        state.remaining -= length;

        // SAFETY: `[start, start + length)` 位于当前分片内，且游标单调前移，
        // 与此前返回的任何切片都不重叠。
        let fragment = unsafe { core::slice::from_raw_parts_mut(start.as_ptr(), length) };
        if zero {
            fragment.fill(0);
        }
        fragment
    }

    /// 复制 `data` 到竞技场并返回副本。
    #[allow(clippy::mut_from_ref)]
    pub fn clone_slice(&self, data: &[u8]) -> &mut [u8] {
        let clone = self.get(data.len(), false);
        clone.copy_from_slice(data);
        clone
    }

    /// 复制字符串到竞技场。
    pub fn clone_str(&self, data: &str) -> &str {
        let clone = self.clone_slice(data.as_bytes());
        // SAFETY: 字节逐一复制自合法的 `&str`。
        unsafe { core::str::from_utf8_unchecked(clone) }
    }

    /// 释放全部池缓冲并复位，竞技场可继续使用。
    pub fn reset(&mut self) {
        let state = self.state.get_mut();
        for chunk in state.refs.drain(..) {
            chunk.release();
        }
        state.cursor = NonNull::dangling();
        state.remaining = 0;
        state.length = 0;
    }

    /// 释放全部池缓冲并消耗竞技场。
    pub fn release(mut self) {
        self.reset();
    }

    fn state(&self) -> &ArenaState {
        // SAFETY: 只读访问；`get` 不会与本方法交错执行（`!Sync` + 无重入）。
        unsafe { &*self.state.get() }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("size", &self.size)
            .field("length", &self.length())
            .field("chunks", &self.chunks())
            .finish()
    }
}
