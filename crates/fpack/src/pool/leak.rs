//! 泄漏追踪：报告“借出后从未释放”的池化租借。
//!
//! 纯诊断用途。未启用时，租借路径只多两次 relaxed 原子读取，不捕获调用栈。

use std::{
    backtrace::Backtrace,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use spin::RwLock;
use tracing::warn;

/// 泄漏回调；在丢弃未释放 `Ref` 的线程上同步调用。
pub type LeakTracker = Arc<dyn Fn(&LeakReport) + Send + Sync>;

static TRACKER: RwLock<Option<LeakTracker>> = RwLock::new(None);
/// 已安装追踪器；安装即隐含捕获调用栈。
static TRACKING: AtomicBool = AtomicBool::new(false);
/// 显式开启的捕获，独立于追踪器的安装与清除。
static CAPTURE: AtomicBool = AtomicBool::new(false);

/// 一次泄漏的上下文。
#[derive(Debug)]
pub struct LeakReport {
    /// 描述符的等级容量。
    pub capacity: usize,
    /// 借出时请求的长度。
    pub len: usize,
    /// 泄漏租借的代际。
    pub generation: u64,
    /// 借出位置的调用栈；仅在启用捕获后存在。
    pub backtrace: Option<Backtrace>,
}

/// 安装或清除进程级泄漏追踪器。
///
/// 追踪器在位期间，之后的租借都会捕获借出调用栈。清除追踪器不影响
/// [`set_backtrace_capture`] 的显式开关：两者任一开启即捕获。
pub fn set_leak_tracker(tracker: Option<LeakTracker>) {
    TRACKING.store(tracker.is_some(), Ordering::Relaxed);
    *TRACKER.write() = tracker;
}

/// 单独控制借出调用栈捕获（不改变已安装的追踪器）。
///
/// 捕获到的调用栈出现在 [`LeakReport::backtrace`] 中；未安装追踪器时仅随 `warn` 日志丢弃。
pub fn set_backtrace_capture(enabled: bool) {
    CAPTURE.store(enabled, Ordering::Relaxed);
}

/// 当前租借是否会捕获调用栈。
pub(crate) fn capture_enabled() -> bool {
    TRACKING.load(Ordering::Relaxed) || CAPTURE.load(Ordering::Relaxed)
}

pub(crate) fn capture() -> Option<Box<Backtrace>> {
    if !capture_enabled() {
        return None;
    }
    Some(Box::new(Backtrace::force_capture()))
}

pub(crate) fn report(report: LeakReport) {
    warn!(
        capacity = report.capacity,
        len = report.len,
        generation = report.generation,
        "pooled ref dropped without release"
    );
    // 回调期间不持有读锁。
    let tracker = Option::clone(&TRACKER.read());
    if let Some(tracker) = tracker {
        tracker(&report);
    }
}
