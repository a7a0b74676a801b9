//! 自旋锁
//!
//! 提供对数据的互斥访问，获取时同时禁用本地中断。
//!
//! 单核约束下锁标志永远不会在持有状态下被观察到：持有者在中断
//! 禁用下运行，不可能被抢占，因此 `lock()` 在目标上退化为一段
//! 纯粹的关中断临界区，绝不自旋。原子标志保留下来，使同一份代码
//! 在宿主测试（真实并行线程）中依然提供互斥。

use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::intr_guard::IntrGuard;

/// 关中断自旋锁，提供互斥访问内部数据的能力。
///
/// 不可重入：持有锁时再次调用 `lock()` 将导致死锁。
///
/// # 示例
/// ```ignore
/// static COUNT: SpinLock<u64> = SpinLock::new(0);
/// {
///     let mut guard = COUNT.lock(); // 获取锁，禁用中断
///     *guard += 1;
/// } // 离开作用域，自动释放锁并恢复中断状态
/// ```
pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

impl<T> SpinLock<T> {
    /// 创建一个新的 SpinLock 实例，初始化内部数据。
    pub const fn new(data: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// 获取自旋锁，并返回一个 RAII 保护器，用于访问和修改内部数据。
    ///
    /// 内部先禁用本地中断，再原子地获取锁标志。
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let intr_guard = IntrGuard::new();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }

        SpinLockGuard {
            lock: self,
            _intr_guard: intr_guard,
        }
    }

    /// 尝试获取自旋锁，如果成功则返回 RAII 保护器，否则返回 None。
    ///
    /// 获取失败时立即恢复中断状态（通过 Drop IntrGuard）。
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let intr_guard = IntrGuard::new();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinLockGuard {
                lock: self,
                _intr_guard: intr_guard,
            })
        } else {
            None
        }
    }

    /// 获取内部数据的可变引用。
    ///
    /// `&mut self` 已在编译期保证独占，无需加锁；用于初始化阶段。
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// 检查锁是否被占用 (仅用于调试/测试)
    #[cfg(test)]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

// Safety: SpinLock 可以在线程间安全共享，
// 因为锁标志保证了对内部数据的互斥访问。
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

/// SpinLock 的 RAII 保护器，提供对锁定数据的访问。
///
/// 当保护器离开作用域时，自动释放锁并恢复中断状态。
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _intr_guard: IntrGuard,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: 持有锁期间独占访问内部数据
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: 持有锁期间独占访问内部数据
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    /// 退出作用域时自动执行，顺序如下：
    /// 1. 释放锁标志。
    /// 2. IntrGuard 被 Drop，恢复中断状态。
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mock as mock;

    #[test]
    fn lock_and_mutate() {
        mock::install();

        let lock = SpinLock::new(0u64);
        {
            let mut guard = lock.lock();
            *guard += 41;
            *guard += 1;
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 42);
    }

    #[test]
    fn try_lock_fails_while_held() {
        mock::install();

        let lock = SpinLock::new(());
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn interrupts_restored_after_unlock() {
        mock::install();

        assert!(crate::arch_ops().interrupts_enabled());
        let lock = SpinLock::new(());
        {
            let _guard = lock.lock();
            assert!(!crate::arch_ops().interrupts_enabled());
            {
                // 嵌套临界区
                let inner = SpinLock::new(());
                let _g2 = inner.lock();
                assert!(!crate::arch_ops().interrupts_enabled());
            }
            assert!(!crate::arch_ops().interrupts_enabled());
        }
        assert!(crate::arch_ops().interrupts_enabled());
    }
}
