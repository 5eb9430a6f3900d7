//! 分级内存池：按 2 的幂划分 16 个尺寸等级（1 KiB ~ 32 MiB），以代际令牌追踪每一次租借。
//!
//! # 模块定位（Why）
//! - 编码目的缓冲、竞技场分片、分块缓冲页全部从这里租借，避免热路径上的逐次堆分配；
//! - 通过代际（generation）令牌在释放时做一次 CAS，即可检测重复释放与“释放后复用”，
//!   无需在每次访问时加锁。
//!
//! # 设计概要（How）
//! - 每个尺寸等级维护独立的 `spin::Mutex<Vec<Descriptor>>` 自由链表，互不干扰；
//! - 全池共享一个 `AtomicU64` 代际计数器，回绕时跳过 0（0 表示空闲）；
//! - 描述符按需懒创建、无限复用，进程存续期间不会单独归还给系统（经典 slab 行为）；
//! - 小于 [`MIN_SIZE`] 或大于 [`MAX_CLASS_SIZE`] 的请求绕过池，直接由系统分配器满足。
//!
//! # 契约说明（What）
//! - **线程安全**：[`Pool`] 为 `Send + Sync + Clone`，克隆只增加引用计数；
//! - **后置条件**：[`Pool::borrow`] 返回的 [`Ref`] 长度恰为请求长度，容量为最小可容纳等级；
//! - **释放纪律**：每个池化 [`Ref`] 必须且只能释放一次，见 [`Ref::release`]。

mod handle;
mod leak;

use std::{
    backtrace::Backtrace,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use spin::Mutex;
use tracing::{debug, trace};

use crate::error::generation_mismatch;

pub use handle::{RawRef, Ref};
pub use leak::{LeakReport, LeakTracker, set_backtrace_capture, set_leak_tracker};

#[cfg(test)]
pub(crate) use leak::capture_enabled;

/// 低于该长度的请求直接走系统分配器。
pub const MIN_SIZE: usize = 9;

/// 尺寸等级数量。
pub const CLASS_COUNT: usize = 16;

/// 最小等级容量（1 KiB）。
pub const MIN_CLASS_SIZE: usize = 1 << 10;

/// 最大等级容量（32 MiB）。
pub const MAX_CLASS_SIZE: usize = MIN_CLASS_SIZE << (CLASS_COUNT - 1);

/// 返回满足 `len` 的最小尺寸等级下标；不应池化时返回 `None`。
pub(crate) fn class_index(len: usize) -> Option<usize> {
    if !(MIN_SIZE..=MAX_CLASS_SIZE).contains(&len) {
        return None;
    }
    let capacity = len.next_power_of_two().max(MIN_CLASS_SIZE);
    Some((capacity / MIN_CLASS_SIZE).trailing_zeros() as usize)
}

/// 返回等级下标对应的容量。
pub(crate) const fn class_capacity(index: usize) -> usize {
    MIN_CLASS_SIZE << index
}

/// `Pool` 是可显式传递的池句柄，同时提供进程级默认实例 [`Pool::global`]。
///
/// # 教案式说明
/// - **意图 (Why)**：按“显式句柄优先、全局实例兜底”的方式暴露池，既便于测试隔离，
///   又保留零配置的使用体验；
/// - **契约 (What)**：克隆句柄共享同一组自由链表与代际计数器；
/// - **风险 (Trade-offs)**：池内描述符不会收缩，峰值内存会一直驻留，
///   这是 slab 复用的代价。
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Pool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("generation", &self.shared.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// 创建独立的空池。
    pub fn new() -> Self {
        Self {
            shared: Arc::new(PoolShared::new()),
        }
    }

    /// 进程级默认池，首次访问时初始化。
    pub fn global() -> &'static Pool {
        static GLOBAL: OnceLock<Pool> = OnceLock::new();
        GLOBAL.get_or_init(Pool::new)
    }

    /// 租借长度为 `len` 的缓冲。
    ///
    /// # 参数与契约
    /// - `len`：请求长度；位于 `[MIN_SIZE, MAX_CLASS_SIZE]` 时从最小可容纳等级租借，
    ///   否则由系统分配器直接分配并返回非池化的 [`Ref`]；
    /// - `zero`：是否清零。仅清零请求的前缀 `[0, len)`，代价与 `len` 成正比而非等级容量；
    ///   未请求清零时，复用的内存可能残留上一位租户的数据。
    ///
    /// # 后置条件
    /// - 返回值解引用后的切片长度恰为 `len`；
    /// - 池化 [`Ref`] 携带全新的非零代际。
    pub fn borrow(&self, len: usize, zero: bool) -> Ref {
        let Some(index) = class_index(len) else {
            self.shared.metrics.bypassed.fetch_add(1, Ordering::Relaxed);
            trace!(len, "pool bypass allocation");
            return Ref::unpooled(vec![0u8; len]);
        };

        let mut descriptor = self.shared.classes[index].acquire(index, &self.shared);
        let generation = self.shared.next_generation();
        if descriptor
            .slot
            .generation
            .compare_exchange(0, generation, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            generation_mismatch();
        }
        if zero {
            descriptor.data[..len].fill(0);
        }
        self.shared.metrics.borrowed.fetch_add(1, Ordering::Relaxed);

        Ref::pooled(
            Arc::clone(&self.shared),
            descriptor,
            generation,
            len,
            leak::capture(),
        )
    }

    /// 租借缓冲并复制 `data`。
    pub fn clone_slice(&self, data: &[u8]) -> Ref {
        let mut buf = self.borrow(data.len(), false);
        buf.copy_from_slice(data);
        buf
    }

    /// 租借缓冲并依次拼接 `parts`。
    pub fn concat(&self, parts: &[&[u8]]) -> Ref {
        let total = parts.iter().map(|part| part.len()).sum();
        let mut buf = self.borrow(total, false);
        let mut offset = 0;
        for part in parts {
            buf[offset..offset + part.len()].copy_from_slice(part);
            offset += part.len();
        }
        buf
    }

    /// 读取统计快照。
    pub fn stats(&self) -> PoolStats {
        self.shared.snapshot()
    }

    /// 判断两个句柄是否指向同一池。
    pub fn same_pool(&self, other: &Pool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    #[cfg(test)]
    pub(crate) fn force_generation(&self, value: u64) {
        self.shared.generation.store(value, Ordering::Relaxed);
    }
}

/// 池级统计快照。
///
/// 所有计数均为 relaxed 读取，仅用于观测，不参与同步。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// 池化租借次数。
    pub borrowed: u64,
    /// 归还次数（含泄漏后由 `Drop` 兜底归还的部分）。
    pub released: u64,
    /// 绕过池、直接由系统分配的次数。
    pub bypassed: u64,
    /// 未显式释放即被丢弃的 `Ref` 数量。
    pub leaked: u64,
    /// 各尺寸等级的明细。
    pub classes: Vec<ClassStats>,
}

impl PoolStats {
    /// 尚未归还的池化租借数量。
    pub fn outstanding(&self) -> u64 {
        self.borrowed.saturating_sub(self.released)
    }

    /// 按容量查找等级明细。
    pub fn class(&self, capacity: usize) -> Option<&ClassStats> {
        self.classes.iter().find(|class| class.capacity == capacity)
    }
}

/// 单个尺寸等级的统计。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ClassStats {
    /// 等级容量。
    pub capacity: usize,
    /// 已创建的描述符数量。
    pub created: usize,
    /// 当前位于自由链表中的描述符数量。
    pub available: usize,
}

pub(crate) struct PoolShared {
    classes: [SizeClass; CLASS_COUNT],
    generation: AtomicU64,
    metrics: PoolMetrics,
}

impl PoolShared {
    fn new() -> Self {
        Self {
            classes: core::array::from_fn(|index| SizeClass::new(class_capacity(index))),
            generation: AtomicU64::new(0),
            metrics: PoolMetrics::default(),
        }
    }

    /// 分配下一个非零代际；计数器回绕时跳过 0。
    fn next_generation(&self) -> u64 {
        loop {
            let generation = self
                .generation
                .fetch_add(1, Ordering::Relaxed)
                .wrapping_add(1);
            if generation != 0 {
                return generation;
            }
        }
    }

    /// 校验代际并把描述符放回自由链表。
    ///
    /// CAS 失败说明该代际已被释放，或描述符已借给新的持有者，直接 panic。
    pub(crate) fn reclaim(&self, descriptor: Descriptor, generation: u64) {
        if descriptor
            .slot
            .generation
            .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            generation_mismatch();
        }
        self.metrics.released.fetch_add(1, Ordering::Relaxed);
        self.classes[descriptor.slot.class].free.lock().push(descriptor);
    }

    /// 经由 [`RawRef`] 释放：先 CAS 抢占释放权，再取回暂存的数据页。
    pub(crate) fn reclaim_parked(&self, slot: &Arc<Slot>, generation: u64) {
        if slot
            .generation
            .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            generation_mismatch();
        }
        let Some(parked) = slot.parked.lock().take() else {
            generation_mismatch();
        };
        self.metrics.released.fetch_add(1, Ordering::Relaxed);
        self.classes[slot.class].free.lock().push(Descriptor {
            slot: Arc::clone(slot),
            data: parked.data,
        });
    }

    /// 槽位随最后一个 [`RawRef`] 消失时，把暂存的数据页换上新槽位放回自由链表。
    fn restock(&self, class: usize, data: Vec<u8>, pool: Weak<PoolShared>) {
        self.metrics.released.fetch_add(1, Ordering::Relaxed);
        self.classes[class].free.lock().push(Descriptor {
            slot: Arc::new(Slot::new(class, pool)),
            data,
        });
    }

    pub(crate) fn record_leak(&self) {
        self.metrics.leaked.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            borrowed: self.metrics.borrowed.load(Ordering::Relaxed),
            released: self.metrics.released.load(Ordering::Relaxed),
            bypassed: self.metrics.bypassed.load(Ordering::Relaxed),
            leaked: self.metrics.leaked.load(Ordering::Relaxed),
            classes: self
                .classes
                .iter()
                .map(|class| ClassStats {
                    capacity: class.capacity,
                    created: class.created.load(Ordering::Relaxed),
                    available: class.free.lock().len(),
                })
                .collect(),
        }
    }
}

struct SizeClass {
    capacity: usize,
    free: Mutex<Vec<Descriptor>>,
    created: AtomicUsize,
}

impl SizeClass {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// 弹出空闲描述符；链表为空时懒创建。
    fn acquire(&self, index: usize, pool: &Arc<PoolShared>) -> Descriptor {
        if let Some(descriptor) = self.free.lock().pop() {
            return descriptor;
        }
        let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(class = index, capacity = self.capacity, created, "pool class grew");
        Descriptor {
            slot: Arc::new(Slot::new(index, Arc::downgrade(pool))),
            data: vec![0u8; self.capacity],
        }
    }
}

#[derive(Default)]
struct PoolMetrics {
    borrowed: AtomicU64,
    released: AtomicU64,
    bypassed: AtomicU64,
    leaked: AtomicU64,
}

/// 池内描述符：定容数据页 + 共享的代际槽位。
///
/// 借出期间数据页随 [`Ref`] 移动，槽位留在 `Arc` 中供 CAS 校验。
pub(crate) struct Descriptor {
    pub(crate) slot: Arc<Slot>,
    pub(crate) data: Vec<u8>,
}

/// 代际槽位。`generation` 非零当且仅当恰有一个未释放的持有者。
pub(crate) struct Slot {
    pub(crate) class: usize,
    pub(crate) generation: AtomicU64,
    /// [`Ref::into_raw`] 之后暂存的数据页，等待 [`RawRef::release`] 取回。
    pub(crate) parked: Mutex<Option<Parked>>,
    pool: Weak<PoolShared>,
}

/// 暂存在槽位中的租借：数据页与泄漏上报所需的上下文。
pub(crate) struct Parked {
    pub(crate) data: Vec<u8>,
    pub(crate) len: usize,
    pub(crate) origin: Option<Box<Backtrace>>,
}

impl Slot {
    fn new(class: usize, pool: Weak<PoolShared>) -> Self {
        Self {
            class,
            generation: AtomicU64::new(0),
            parked: Mutex::new(None),
            pool,
        }
    }
}

/// 最后一个 [`RawRef`] 未释放即被丢弃：代际仍非零且数据页仍暂存在槽位中。
///
/// 与 [`Ref`] 的泄漏路径一致，先计数、再上报，最后把数据页放回池中；
/// 池已先行销毁时只上报。
impl Drop for Slot {
    fn drop(&mut self) {
        let generation = *self.generation.get_mut();
        if generation == 0 {
            return;
        }
        let Some(parked) = self.parked.get_mut().take() else {
            return;
        };
        let pool = self.pool.upgrade();
        if let Some(pool) = &pool {
            pool.record_leak();
        }
        leak::report(LeakReport {
            capacity: parked.data.len(),
            len: parked.len,
            generation,
            backtrace: parked.origin.map(|origin| *origin),
        });
        if let Some(pool) = pool {
            pool.restock(self.class, parked.data, self.pool.clone());
        }
    }
}
