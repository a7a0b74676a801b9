//! Mock 实现模块
//!
//! 提供架构与调度器的 Mock 实现，用于测试。

pub mod arch;
pub mod threads;

use std::sync::Once;

static INSTALL: Once = Once::new();

/// 注册全局 Mock 实现（幂等）。
///
/// 每个测试入口先调用一次；重复调用无副作用。
pub fn install() {
    INSTALL.call_once(|| {
        // SAFETY: Once 保证注册恰好发生一次，且先于任何使用
        unsafe {
            sync::register_arch_ops(&arch::MOCK_ARCH_OPS);
            sync::register_thread_ops(&threads::MOCK_THREADS);
        }
    });
}
