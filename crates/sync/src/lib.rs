//! 同步原语
//!
//! 向内核其它模块提供阻塞式同步原语与执行上下文抽象：
//! 自旋锁、信号量、睡眠读写锁、中断保护等。
//!
//! # 执行上下文
//!
//! 内核只有两种执行侧：**中断上下文**（时钟中断处理函数，绝不允许阻塞）
//! 和**线程上下文**（其余代码，可以阻塞）。中断上下文由 [`IrqContext`]
//! 能力凭证标记；会阻塞的操作不接受该凭证，并在入口处以致命检查
//! 防止在中断被屏蔽的路径上误用。
//!
//! # 架构与调度器依赖
//!
//! 此 crate 通过 [`ArchOps`] 与 [`ThreadOps`] 两个 trait 抽象架构相关
//! 操作和外部调度器。使用前必须分别调用 [`register_arch_ops`] /
//! [`register_thread_ops`] 注册实现。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod intr_guard;
mod rwlock;
mod semaphore;
mod spin_lock;

#[cfg(test)]
mod test_mock;

pub use intr_guard::IntrGuard;
pub use rwlock::{RawSleepRwLock, SleepRwLock, SleepRwLockReadGuard, SleepRwLockWriteGuard};
pub use semaphore::Semaphore;
pub use spin_lock::{SpinLock, SpinLockGuard};

use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 内核线程句柄
///
/// 由外部调度器分配的不透明编号；本 crate 只转发，不解释其内容。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub usize);

/// 中断上下文能力凭证
///
/// 只能在中断入口处以 `unsafe` 构造，且不可跨线程传递。
/// 接受 `&IrqContext` 的接口是中断上下文安全的；持有凭证期间
/// 不得调用任何可能阻塞的操作。
pub struct IrqContext {
    _not_send: PhantomData<*const ()>,
}

impl IrqContext {
    /// 声明当前代码正运行在中断上下文中。
    ///
    /// # Safety
    /// 调用者必须确实处于中断处理函数内（中断已被硬件屏蔽），
    /// 并且不把凭证泄漏到中断处理函数之外。
    pub unsafe fn enter() -> Self {
        IrqContext {
            _not_send: PhantomData,
        }
    }
}

/// 架构相关操作的 trait
///
/// 由内核在启动时实现并注册，提供单核的本地中断控制。
pub trait ArchOps: Send + Sync {
    /// 读取并禁用中断，返回之前的状态
    ///
    /// # Safety
    /// 调用者必须负责之后用 [`ArchOps::restore_interrupts`] 恢复状态
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 当前中断是否处于启用状态
    fn interrupts_enabled(&self) -> bool;
}

/// 外部调度器操作的 trait
///
/// 由内核线程层实现并注册。本 crate 的阻塞原语只通过这组接口
/// 触达线程状态，自身不持有任何线程控制块。
pub trait ThreadOps: Send + Sync {
    /// 当前正在运行的线程
    fn current(&self) -> ThreadId;

    /// 创建并启动一个内核线程
    fn spawn(&self, name: &'static str, entry: fn());

    /// 阻塞当前线程，直到被 unblock/try_unblock 唤醒
    ///
    /// 采用唤醒令牌语义：若唤醒先于阻塞到达，阻塞立即返回并消费
    /// 令牌。这消除了"先入队、后阻塞"序列中的丢失唤醒窗口。
    ///
    /// # Safety
    /// 必须在中断禁用的情况下调用，且调用者已安排好唤醒来源。
    unsafe fn block_current(&self);

    /// 使指定线程可运行
    ///
    /// 同样采用唤醒令牌语义，见 [`ThreadOps::block_current`]。
    fn unblock(&self, thread: ThreadId);

    /// 非阻塞地尝试唤醒指定线程
    ///
    /// 线程未处于阻塞态时为无副作用的空操作，返回 false。
    /// 中断上下文安全：不获取任何可能被抢占持有的锁。
    fn try_unblock(&self, thread: ThreadId) -> bool;

    /// 每个时钟 tick 的调度器簿记钩子（中断上下文安全）
    fn on_tick(&self);
}

// ========== 全局注册 ==========
//
// 与 trait 对象等价的 fat pointer 以 (data, vtable) 两个 usize 存放，
// 注册一次后对所有上下文可见。

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

static THREAD_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static THREAD_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: transmute 在这里是安全的，因为 fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_DATA.store(data, Ordering::Release);
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 注册调度器操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_thread_ops(ops: &'static dyn ThreadOps) {
    let ptr = ops as *const dyn ThreadOps;
    // SAFETY: 同 register_arch_ops
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ThreadOps, (usize, usize)>(ptr) };
    THREAD_OPS_DATA.store(data, Ordering::Release);
    THREAD_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取架构操作实例
#[inline]
pub fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("sync: ArchOps not registered, call register_arch_ops first");
    }
    // SAFETY: data 和 vtable 是通过 register_arch_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}

/// 获取调度器操作实例
#[inline]
pub fn thread_ops() -> &'static dyn ThreadOps {
    let data = THREAD_OPS_DATA.load(Ordering::Acquire);
    let vtable = THREAD_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("sync: ThreadOps not registered, call register_thread_ops first");
    }
    // SAFETY: data 和 vtable 是通过 register_thread_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ThreadOps>((data, vtable)) }
}
