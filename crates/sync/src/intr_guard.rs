//! 中断保护器
//!
//! 基于 RAII 实现中断保护，在创建时禁用中断，销毁时恢复。
//!
//! 单核内核中，禁用本地中断即获得了对共享数据的互斥：任务之间
//! 只有协作式切换，而唯一的抢占来源（时钟中断）已被屏蔽。

use crate::arch_ops;

/// 中断保护器，基于 RAII 实现中断保护。
///
/// 在创建时原子地禁用中断并保存之前的状态；
/// 在销毁时自动恢复之前的中断状态。可以嵌套使用。
///
/// # 示例
/// ```ignore
/// {
///     let _guard = IntrGuard::new(); // 禁用中断
///     // 临界区代码
/// } // 离开作用域，自动恢复中断状态
/// ```
pub struct IntrGuard {
    flags: usize,
}

impl IntrGuard {
    /// 原子地禁用中断并返回一个 IntrGuard 实例。
    ///
    /// 该实例在离开作用域时会自动恢复中断状态。
    pub fn new() -> Self {
        // SAFETY: flags 由本 guard 保存，Drop 时按原样恢复。
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };
        IntrGuard { flags }
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    /// 当 IntrGuard 离开作用域时，自动恢复中断状态。
    fn drop(&mut self) {
        // SAFETY: flags 是在创建 IntrGuard 时保存的，
        // 因此恢复操作是安全的。
        unsafe { arch_ops().restore_interrupts(self.flags) };
    }
}
