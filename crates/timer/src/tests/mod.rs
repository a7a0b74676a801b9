//! TimerCore 整机测试
//!
//! 用 mock 调度器驱动完整链路：真实 OS 线程扮演内核线程，
//! 测试线程扮演时钟中断入口。
