//! 目的地状态使用的锁与条件变量。
//!
//! 常规构建基于 `parking_lot`；启用 `--cfg loom`（或 `spark_loom`）时切换到 `loom::sync`，
//! 让模型检查直接穷举 [`crate::destination`] 协议的全部交错。两套实现暴露同一组方法，
//! 条件变量统一采用“按值交出守卫、再取回守卫”的形式。

#[cfg(not(any(loom, spark_loom)))]
use parking_lot as backing;
#[cfg(not(any(loom, spark_loom)))]
pub(crate) use parking_lot::MutexGuard;

#[cfg(any(loom, spark_loom))]
use loom::sync as backing;
#[cfg(any(loom, spark_loom))]
pub(crate) use loom::sync::MutexGuard;
#[cfg(any(loom, spark_loom))]
use std::sync::PoisonError;

pub(crate) struct Mutex<T>(backing::Mutex<T>);

impl<T> Mutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(backing::Mutex::new(value))
    }

    #[cfg(not(any(loom, spark_loom)))]
    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock()
    }

    // 临界区内不会 panic，中毒只可能来自测试断言；沿用内部数据即可。
    #[cfg(any(loom, spark_loom))]
    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct Condvar(backing::Condvar);

impl Condvar {
    pub(crate) fn new() -> Self {
        Self(backing::Condvar::new())
    }

    pub(crate) fn notify_one(&self) {
        self.0.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.0.notify_all();
    }

    #[cfg(not(any(loom, spark_loom)))]
    pub(crate) fn wait<'a, T>(&self, mut guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.0.wait(&mut guard);
        guard
    }

    #[cfg(any(loom, spark_loom))]
    pub(crate) fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.0.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// 在 `condition` 成立期间反复等待，返回时条件已不成立。
    pub(crate) fn wait_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: F,
    ) -> MutexGuard<'a, T>
    where
        F: FnMut(&T) -> bool,
    {
        while condition(&*guard) {
            guard = self.wait(guard);
        }
        guard
    }
}
