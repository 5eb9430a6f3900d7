//! `pool_contract` 集成测试：从公开 API 视角验证 `Pool` 的租借、释放与代际契约。
//!
//! # 测试目标（Why）
//! - 尺寸等级选择、绕过阈值、清零语义是编码热路径的基础，任何回归都会放大为内存浪费或脏数据；
//! - 重复释放与释放后复用必须以 panic 暴露，不能被静默吞掉。
//!
//! # 结构安排（How）
//! - 容量类测试覆盖全部等级与两端绕过区间；
//! - 代际类测试借助可克隆的 `RawRef` 构造重复释放；
//! - 统计类测试检查 `PoolStats` 与实际租借一致。

use fpack::{
    Pool,
    pool::{MAX_CLASS_SIZE, MIN_CLASS_SIZE, MIN_SIZE},
};

/// 每个等级都返回“最小可容纳”的容量，且视图长度恰为请求长度。
#[test]
fn borrow_selects_smallest_fitting_class() {
    let pool = Pool::new();
    for shift in 0..16 {
        let len = 777usize << shift;
        if len > MAX_CLASS_SIZE {
            break;
        }
        let buf = pool.borrow(len, false);
        assert_eq!(buf.len(), len);
        assert_eq!(buf.capacity(), len.next_power_of_two().max(MIN_CLASS_SIZE));
        assert!(buf.is_pooled());
        buf.release();
    }
    assert_eq!(pool.stats().outstanding(), 0);
}

/// 阈值之外的请求绕过池，返回容量等于长度的空操作句柄。
#[test]
fn out_of_range_lengths_bypass_pool() {
    let pool = Pool::new();
    for len in [0, 1, MIN_SIZE - 1, MAX_CLASS_SIZE + 1] {
        let buf = pool.borrow(len, true);
        assert!(!buf.is_pooled());
        assert_eq!(buf.capacity(), len);
        assert_eq!(buf.generation(), 0);
        buf.release();
    }
    let stats = pool.stats();
    assert_eq!(stats.bypassed, 4);
    assert_eq!(stats.borrowed, 0);

    let noop = pool.borrow(4, false).into_raw();
    assert!(noop.is_noop());
    noop.clone().release();
    noop.release();
}

/// 重复释放同一代际是致命错误。
#[test]
#[should_panic(expected = "fpack: generation mismatch")]
fn double_release_panics() {
    let pool = Pool::new();
    let raw = pool.borrow(123, false).into_raw();
    raw.clone().release();
    raw.release();
}

/// 描述符被新持有者借走后，旧句柄的释放同样是致命错误。
#[test]
#[should_panic(expected = "fpack: generation mismatch")]
fn release_after_reuse_panics() {
    let pool = Pool::new();
    let stale = pool.borrow(123, false).into_raw();
    stale.clone().release();

    let fresh = pool.borrow(456, false);
    assert!(fresh.generation() > stale.generation());
    stale.release();
}

/// 代际单调递增，且每次租借都不相同。
#[test]
fn generations_are_unique_and_nonzero() {
    let pool = Pool::new();
    let first = pool.borrow(64, false);
    let second = pool.borrow(64, false);
    assert_ne!(first.generation(), 0);
    assert!(second.generation() > first.generation());
    first.release();
    second.release();
}

/// `clone_slice` 与 `concat` 的结果内容与长度。
#[test]
fn clone_and_concat_copy_payload() {
    let pool = Pool::new();
    let clone = pool.clone_slice(b"hello world!");
    assert_eq!(&clone[..], b"hello world!");
    assert!(clone.is_pooled());

    let parts: [&[u8]; 3] = [b"foo", b"", b"bar-baz"];
    let joined = pool.concat(&parts);
    assert_eq!(&joined[..], b"foobar-baz");
    clone.release();
    joined.release();
}

/// 并发租借/释放后，统计回到平衡，且同一等级的描述符被复用。
#[test]
fn concurrent_borrow_release_balances() {
    let pool = Pool::new();
    std::thread::scope(|scope| {
        for worker in 0..4u8 {
            let pool = pool.clone();
            scope.spawn(move || {
                for _ in 0..256 {
                    let mut buf = pool.borrow(512, true);
                    buf.fill(worker);
                    assert!(buf.iter().all(|byte| *byte == worker));
                    buf.release();
                }
            });
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.borrowed, 1024);
    assert_eq!(stats.outstanding(), 0);
    let class = stats.class(MIN_CLASS_SIZE).expect("1 KiB 等级必须存在");
    assert!(class.created <= 4, "每个线程最多持有一个描述符");
    assert_eq!(class.available, class.created);
}

/// 全局池是单例。
#[test]
fn global_pool_is_shared() {
    assert!(Pool::global().same_pool(Pool::global()));
    let local = Pool::new();
    assert!(!local.same_pool(Pool::global()));
    Pool::global().borrow(32, false).release();
}
