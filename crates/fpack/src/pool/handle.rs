use std::{
    backtrace::Backtrace,
    fmt,
    mem,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use super::{Descriptor, Parked, PoolShared, Slot, leak};

/// `Ref` 是一次租借的所有权句柄：既是数据视图，也承担“恰好释放一次”的义务。
///
/// # 设计初衷（Why）
/// - 借用切片与释放能力绑定在同一个值上，释放时按值消耗（`release(self)`），
///   由编译器保证不会重复释放、也不会在释放后继续访问数据；
/// - 运行时代际校验仍然保留，用于防御经 [`RawRef`] 跨越同步边界的场景。
///
/// # 结构设计（How）
/// - 池化租借持有描述符的数据页（`Vec<u8>`）与共享槽位，解引用得到 `[0, len)` 视图；
/// - 绕过池的租借直接持有系统分配的 `Vec<u8>`，释放为空操作；
/// - `Ref::default()` 是合法的空操作句柄，长度为 0。
///
/// # 契约说明（What）
/// - **前置条件**：池化 `Ref` 必须调用一次 [`Ref::release`]（或转为 [`RawRef`] 后释放）；
/// - **后置条件**：未释放即被丢弃时，会上报泄漏追踪器并记录 `warn` 日志，
///   随后描述符仍被归还池中，避免容量永久流失。
pub struct Ref {
    inner: RefInner,
}

enum RefInner {
    Unpooled(Vec<u8>),
    Pooled(PooledRef),
    Released,
}

struct PooledRef {
    pool: Arc<PoolShared>,
    descriptor: Descriptor,
    generation: u64,
    len: usize,
    origin: Option<Box<Backtrace>>,
}

impl Default for Ref {
    fn default() -> Self {
        Self::unpooled(Vec::new())
    }
}

impl Ref {
    pub(crate) fn unpooled(data: Vec<u8>) -> Self {
        Self {
            inner: RefInner::Unpooled(data),
        }
    }

    pub(crate) fn pooled(
        pool: Arc<PoolShared>,
        descriptor: Descriptor,
        generation: u64,
        len: usize,
        origin: Option<Box<Backtrace>>,
    ) -> Self {
        Self {
            inner: RefInner::Pooled(PooledRef {
                pool,
                descriptor,
                generation,
                len,
                origin,
            }),
        }
    }

    /// 是否来自池（非空操作句柄）。
    pub fn is_pooled(&self) -> bool {
        matches!(self.inner, RefInner::Pooled(_))
    }

    /// 借出时分配的代际；非池化句柄返回 0。
    pub fn generation(&self) -> u64 {
        match &self.inner {
            RefInner::Pooled(pooled) => pooled.generation,
            _ => 0,
        }
    }

    /// 底层容量：池化时为等级容量，否则等于长度。
    pub fn capacity(&self) -> usize {
        match &self.inner {
            RefInner::Unpooled(data) => data.len(),
            RefInner::Pooled(pooled) => pooled.descriptor.data.len(),
            RefInner::Released => 0,
        }
    }

    /// 释放租借。非池化句柄为空操作。
    ///
    /// # Panics
    /// 槽位代际与借出时不一致时 panic（`fpack: generation mismatch`）。
    pub fn release(mut self) {
        if let RefInner::Pooled(pooled) = mem::replace(&mut self.inner, RefInner::Released) {
            pooled.pool.reclaim(pooled.descriptor, pooled.generation);
        }
    }

    /// 分离数据视图，只保留释放能力。
    ///
    /// 数据页暂存在槽位中，直到返回的 [`RawRef`] 被释放；非池化句柄得到空操作 `RawRef`。
    pub fn into_raw(mut self) -> RawRef {
        match mem::replace(&mut self.inner, RefInner::Released) {
            RefInner::Pooled(pooled) => {
                let PooledRef {
                    pool,
                    descriptor: Descriptor { slot, data },
                    generation,
                    len,
                    origin,
                } = pooled;
                *slot.parked.lock() = Some(Parked { data, len, origin });
                RawRef {
                    inner: Some(RawInner {
                        pool,
                        slot,
                        generation,
                    }),
                }
            }
            _ => RawRef::default(),
        }
    }
}

impl Deref for Ref {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.inner {
            RefInner::Unpooled(data) => data,
            RefInner::Pooled(pooled) => &pooled.descriptor.data[..pooled.len],
            RefInner::Released => &[],
        }
    }
}

impl DerefMut for Ref {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.inner {
            RefInner::Unpooled(data) => data,
            RefInner::Pooled(pooled) => &mut pooled.descriptor.data[..pooled.len],
            RefInner::Released => &mut [],
        }
    }
}

impl AsRef<[u8]> for Ref {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("generation", &self.generation())
            .finish()
    }
}

impl Drop for Ref {
    fn drop(&mut self) {
        if let RefInner::Pooled(pooled) = mem::replace(&mut self.inner, RefInner::Released) {
            pooled.pool.record_leak();
            leak::report(leak::LeakReport {
                capacity: pooled.descriptor.data.len(),
                len: pooled.len,
                generation: pooled.generation,
                backtrace: pooled.origin.map(|origin| *origin),
            });
            pooled.pool.reclaim(pooled.descriptor, pooled.generation);
        }
    }
}

/// `RawRef` 是与数据视图分离的释放能力：`{池, 代际, 槽位}`。
///
/// # 教案式说明
/// - **意图 (Why)**：当释放权需要跨越编译期无法追踪的共享边界（例如登记在表中、由另一线程回收），
///   `RawRef` 以 `Clone` 的形式存在，重复释放会在运行时被代际 CAS 拦截；
/// - **契约 (What)**：同一代际只允许一次成功释放；第二次释放，或在描述符被借给新持有者后释放，
///   都会 panic（`fpack: generation mismatch`）；
/// - **泄漏 (What)**：最后一个副本未释放即被丢弃时，槽位随之销毁并上报泄漏追踪器，
///   数据页回到池中，与 [`Ref`] 的泄漏路径一致。
#[derive(Clone, Default)]
pub struct RawRef {
    inner: Option<RawInner>,
}

#[derive(Clone)]
struct RawInner {
    pool: Arc<PoolShared>,
    slot: Arc<Slot>,
    generation: u64,
}

impl RawRef {
    /// 是否为空操作句柄。
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// 捕获的代际；空操作句柄返回 0。
    pub fn generation(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.generation)
    }

    /// 释放租借。
    ///
    /// # Panics
    /// 代际已被释放或已被复用时 panic。
    pub fn release(self) {
        if let Some(inner) = self.inner {
            inner.pool.reclaim_parked(&inner.slot, inner.generation);
        }
    }

    #[cfg(test)]
    pub(crate) fn slot_data_for_test(&self) -> Vec<u8> {
        self.inner
            .as_ref()
            .and_then(|inner| inner.slot.parked.lock().as_ref().map(|parked| parked.data.clone()))
            .unwrap_or_default()
    }
}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRef")
            .field("generation", &self.generation())
            .finish()
    }
}
