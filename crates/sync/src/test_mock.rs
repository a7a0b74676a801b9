//! 测试专用的 Mock 绑定
//!
//! 把 test-support 的裸 Mock 机制绑到**本 crate 实例**的
//! ArchOps/ThreadOps 上（test-support 自带的绑定指向它自己
//! 依赖的那份 sync，测试本 crate 时并不是同一实例）。

use std::sync::Once;
use std::vec::Vec;

use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::threads;

use crate::{ArchOps, ThreadId, ThreadOps};

/// 绑定到本 crate ArchOps 的 Mock 架构操作
pub struct MockArch;
/// 全局 Mock 实例
pub static MOCK_ARCH: MockArch = MockArch;

impl ArchOps for MockArch {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        MOCK_ARCH_OPS.read_and_disable_interrupts()
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        MOCK_ARCH_OPS.restore_interrupts(flags);
    }

    fn interrupts_enabled(&self) -> bool {
        MOCK_ARCH_OPS.interrupts_enabled()
    }
}

/// 绑定到本 crate ThreadOps 的 Mock 调度器操作
pub struct MockThreads;
/// 全局 Mock 实例
pub static MOCK_THREADS: MockThreads = MockThreads;

impl ThreadOps for MockThreads {
    fn current(&self) -> ThreadId {
        ThreadId(threads::raw_current())
    }

    fn spawn(&self, name: &'static str, entry: fn()) {
        threads::raw_spawn(name, entry);
    }

    unsafe fn block_current(&self) {
        threads::raw_block_current();
    }

    fn unblock(&self, thread: ThreadId) {
        threads::raw_wake(thread.0);
    }

    fn try_unblock(&self, thread: ThreadId) -> bool {
        threads::raw_try_wake(thread.0)
    }

    fn on_tick(&self) {
        threads::raw_on_tick();
    }
}

static INSTALL: Once = Once::new();

/// 注册 Mock 实现（幂等）。每个测试入口先调用一次。
pub fn install() {
    INSTALL.call_once(|| {
        // SAFETY: Once 保证注册恰好发生一次，且先于任何使用
        unsafe {
            crate::register_arch_ops(&MOCK_ARCH);
            crate::register_thread_ops(&MOCK_THREADS);
        }
    });
}

/// 为当前 OS 线程分配一个新身份并返回。
pub fn adopt() -> ThreadId {
    ThreadId(threads::raw_adopt())
}

/// 分配一个新线程编号。
pub fn new_tid() -> ThreadId {
    ThreadId(threads::raw_new_id())
}

/// 将当前 OS 线程的身份切换为 `thread`。
pub fn set_current(thread: ThreadId) {
    threads::raw_set_current(thread.0);
}

/// 取走当前 OS 线程记录的唤醒事件。
pub fn take_unblocked() -> Vec<ThreadId> {
    threads::raw_take_woken().into_iter().map(ThreadId).collect()
}
