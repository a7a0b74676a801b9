//! 架构相关操作的 Mock 实现
//!
//! 中断开关按 OS 线程各自维护（thread_local），模拟"每个内核
//! 线程各自携带一份中断上下文"的单核语义，并使并行运行的测试
//! 互不干扰。
//!
//! 固有方法与 `sync::ArchOps` 一一对应；需要把同一份状态绑到
//! 别的 trait 实例上的测试可直接调用固有方法自行封装。

use std::cell::Cell;
use sync::ArchOps;

thread_local! {
    static INTR_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Mock 架构操作
pub struct MockArchOps;

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps;

impl MockArchOps {
    /// 读取并"禁用"当前线程的中断开关，返回之前的状态。
    pub fn read_and_disable_interrupts(&self) -> usize {
        INTR_ENABLED.with(|c| {
            let prev = c.get();
            c.set(false);
            prev as usize
        })
    }

    /// 恢复当前线程的中断开关。
    pub fn restore_interrupts(&self, flags: usize) {
        INTR_ENABLED.with(|c| c.set(flags != 0));
    }

    /// 当前线程的中断开关状态。
    pub fn interrupts_enabled(&self) -> bool {
        INTR_ENABLED.with(Cell::get)
    }

    /// 直接设定当前线程的中断开关。
    pub fn set_enabled(&self, enabled: bool) {
        INTR_ENABLED.with(|c| c.set(enabled));
    }
}

impl ArchOps for MockArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        MockArchOps::read_and_disable_interrupts(self)
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        MockArchOps::restore_interrupts(self, flags)
    }

    fn interrupts_enabled(&self) -> bool {
        MockArchOps::interrupts_enabled(self)
    }
}

/// 直接设定当前线程的中断开关（测试用）
pub fn set_interrupts_enabled(enabled: bool) {
    MOCK_ARCH_OPS.set_enabled(enabled);
}
