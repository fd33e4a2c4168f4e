//! 互斥锁的构建期切换。

//
// 教案级说明：常规构建使用 `parking_lot::Mutex`（无毒化、无 `Result`）；
// 启用 `--cfg loom` 时切换为 Loom 的互斥锁，使模型检查能穷举加锁交错。
// 两者的差异被收敛在 `lock` 一个函数里，通道代码无需感知。

#[cfg(not(loom))]
pub(crate) use parking_lot::{Mutex, MutexGuard};

#[cfg(loom)]
pub(crate) use loom::sync::{Mutex, MutexGuard};

#[cfg(not(loom))]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock()
}

/// Loom 的互斥锁沿用标准库的毒化语义；持锁线程 panic 后继续使用内部状态。
#[cfg(loom)]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
