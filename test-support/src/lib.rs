//! 测试支持 crate
//!
//! 提供宿主侧的 Mock 实现：以 OS 线程模拟内核线程、以线程局部
//! 状态模拟单核中断开关，使 sync 与 timer 的阻塞路径可以在
//! 标准 `cargo test` 下真实运行。

pub mod mock;
